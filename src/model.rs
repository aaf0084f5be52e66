use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type EstablishmentId = String;
pub type UserId = i64;

/// Whole currency units. Prices never carry fractions.
pub type Price = i64;

/// Capacity of a unit type that declares no positive unit count.
pub const UNLIMITED_UNITS: u32 = u32::MAX;

/// Half-open stay `[start, end)` in nights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateSpan start must be before end");
        Self { start, end }
    }

    /// `nights` nights starting at `start`. `None` on zero nights or calendar overflow.
    pub fn stay(start: NaiveDate, nights: u32) -> Option<Self> {
        if nights == 0 {
            return None;
        }
        let end = start.checked_add_days(Days::new(u64::from(nights)))?;
        Some(Self::new(start, end))
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if the night of `day` falls inside the stay.
    pub fn contains_night(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }

    pub fn each_night(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d < self.end)
    }
}

// ── Closed vocabularies ──────────────────────────────────────────

/// Raised when a vocabulary value is not one of the known spellings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub vocabulary: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: '{}'", self.vocabulary, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! vocabulary {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($text) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(UnknownVariant { vocabulary: $label, value: s.to_string() })
            }
        }
    };
}

vocabulary!(EstablishmentType, "establishment type", {
    Hotel => "HOTEL",
    Restaurant => "RESTAURANT",
});

vocabulary!(UnitCategory, "unit category", {
    Room => "ROOM",
    Table => "TABLE",
});

vocabulary!(BookingStatus, "booking status", {
    PendingPayment => "PENDING_PAYMENT",
    Confirmed => "CONFIRMED",
    Cancelled => "CANCELLED",
});

vocabulary!(UserRole, "user role", {
    Customer => "CUSTOMER",
    Partner => "PARTNER",
});

impl BookingStatus {
    /// Pending and confirmed bookings hold capacity; cancelled ones release it.
    pub fn is_active(self) -> bool {
        matches!(self, Self::PendingPayment | Self::Confirmed)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (Self::PendingPayment, Self::Confirmed)
                | (Self::Confirmed, Self::Cancelled)
                | (Self::Cancelled, Self::Confirmed)
        )
    }
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Establishment {
    pub id: EstablishmentId,
    pub owner_id: UserId,
    pub name: String,
    pub kind: EstablishmentType,
    pub city: String,
    pub address: Option<String>,
    pub amenities: Vec<String>,
    pub star_rating: u8,
    pub image_url_main: Option<String>,
    pub image_urls_gallery: Vec<String>,
    /// Closed establishments are hidden from search and refuse reservations.
    pub available: bool,
    /// Chooses the daily ledger over unit-type capacity counting.
    pub has_inventory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitType {
    pub id: Ulid,
    pub establishment_id: EstablishmentId,
    pub category: UnitCategory,
    pub code: String,
    pub name: String,
    /// Guest capacity of one unit.
    pub capacity: Option<u32>,
    pub has_balcony: Option<bool>,
    pub base_price: Option<Price>,
    pub total_units: Option<u32>,
    pub active: bool,
}

impl UnitType {
    /// Display label: the name when present, the code otherwise.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() { &self.code } else { &self.name }
    }

    pub fn answers_to(&self, item: &str) -> bool {
        same_item(&self.code, item) || same_item(&self.name, item)
    }

    /// Units that may be held at once; unset or non-positive means unlimited.
    pub fn unit_capacity(&self) -> u32 {
        match self.total_units {
            Some(n) if n > 0 => n,
            _ => UNLIMITED_UNITS,
        }
    }
}

/// Case-insensitive item-type comparison used for both unit types and ledger rows.
pub fn same_item(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.to_lowercase() == b.to_lowercase()
}

/// One ledger row: stock of one item type for one night.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDay {
    pub id: Ulid,
    pub establishment_id: EstablishmentId,
    pub date: NaiveDate,
    pub item_type: String,
    pub floor_area: Option<String>,
    pub total_units: u32,
    pub units_booked: u32,
    pub price: Price,
    pub has_balcony: Option<bool>,
    pub item_image_url: Option<String>,
}

impl InventoryDay {
    pub fn units_available(&self) -> u32 {
        self.total_units.saturating_sub(self.units_booked)
    }

    pub fn has_room(&self) -> bool {
        self.units_booked < self.total_units
    }
}

/// One night's ledger row a booking holds a counter on, by the row's own item type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerNight {
    pub date: NaiveDate,
    pub item_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: UserId,
    pub establishment_id: EstablishmentId,
    pub partner_id: UserId,
    pub start_date: NaiveDate,
    pub duration: u32,
    pub total_price: Price,
    pub status: BookingStatus,
    pub booked_item_type: String,
    pub booked_floor_area: Option<String>,
    pub num_guests: Option<u32>,
    /// Ledger nights this booking currently holds a counter on.
    pub counted_nights: Vec<LedgerNight>,
}

impl Booking {
    pub fn span(&self) -> DateSpan {
        // Stored bookings were validated at creation, so the stay always exists.
        DateSpan::stay(self.start_date, self.duration.max(1))
            .unwrap_or(DateSpan { start: self.start_date, end: self.start_date })
    }
}

/// What an establishment offers for one night, after availability is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub establishment_id: EstablishmentId,
    pub establishment_name: String,
    pub city: String,
    pub star_rating: u8,
    pub image_url_main: Option<String>,
    pub image_urls_gallery: Vec<String>,
    pub item_type: String,
    pub floor_area: Option<String>,
    pub units_available: u32,
    pub final_price: Option<Price>,
    pub item_image_url: Option<String>,
    /// Guest capacity of one unit, when the source knows it.
    pub capacity: Option<u32>,
    pub has_balcony: Option<bool>,
}

// ── Per-establishment state ──────────────────────────────────────

fn ledger_key(date: NaiveDate, item_type: &str) -> (NaiveDate, String) {
    (date, item_type.trim().to_lowercase())
}

/// Everything guarded by one establishment lock.
#[derive(Debug, Clone)]
pub struct EstablishmentState {
    pub info: Establishment,
    pub unit_types: Vec<UnitType>,
    /// Ledger rows keyed by night and lowercased item type.
    pub inventory: BTreeMap<(NaiveDate, String), InventoryDay>,
    /// All bookings, sorted by `start_date`.
    pub bookings: Vec<Booking>,
}

impl EstablishmentState {
    pub fn new(info: Establishment) -> Self {
        Self {
            info,
            unit_types: Vec::new(),
            inventory: BTreeMap::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by start date.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.start_date <= booking.start_date);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// Bookings whose stay overlaps `query`, regardless of status.
    /// Binary search skips everything starting on or after `query.end`.
    pub fn overlapping(&self, query: &DateSpan) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start_date < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span().end > query.start)
    }

    pub fn has_active_bookings(&self) -> bool {
        self.bookings.iter().any(|b| b.status.is_active())
    }

    pub fn unit_type(&self, id: &Ulid) -> Option<&UnitType> {
        self.unit_types.iter().find(|u| u.id == *id)
    }

    pub fn unit_type_mut(&mut self, id: &Ulid) -> Option<&mut UnitType> {
        self.unit_types.iter_mut().find(|u| u.id == *id)
    }

    /// First active unit type whose code or name matches.
    pub fn active_unit_type(&self, item: &str) -> Option<&UnitType> {
        self.unit_types.iter().find(|u| u.active && u.answers_to(item))
    }

    pub fn ledger_row(&self, date: NaiveDate, item_type: &str) -> Option<&InventoryDay> {
        self.inventory.get(&ledger_key(date, item_type))
    }

    pub fn ledger_row_mut(&mut self, date: NaiveDate, item_type: &str) -> Option<&mut InventoryDay> {
        self.inventory.get_mut(&ledger_key(date, item_type))
    }

    pub fn upsert_ledger_row(&mut self, row: InventoryDay) {
        self.inventory.insert(ledger_key(row.date, &row.item_type), row);
    }

    /// All ledger rows for one night, ordered by item type.
    pub fn ledger_rows_on(&self, date: NaiveDate) -> impl Iterator<Item = &InventoryDay> {
        self.inventory
            .range((date, String::new())..)
            .take_while(move |((d, _), _)| *d == date)
            .map(|(_, row)| row)
    }
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEstablishment {
    pub id: Option<EstablishmentId>,
    pub owner_id: UserId,
    pub name: String,
    pub kind: EstablishmentType,
    pub city: String,
    pub address: Option<String>,
    pub amenities: Vec<String>,
    pub star_rating: u8,
    pub image_url_main: Option<String>,
    pub image_urls_gallery: Vec<String>,
    pub has_inventory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnitType {
    pub establishment_id: EstablishmentId,
    pub category: UnitCategory,
    pub code: String,
    pub name: String,
    pub capacity: Option<u32>,
    pub has_balcony: Option<bool>,
    pub base_price: Option<Price>,
    pub total_units: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryUpsert {
    pub owner_id: UserId,
    pub establishment_id: EstablishmentId,
    pub date: NaiveDate,
    pub item_type: String,
    pub floor_area: Option<String>,
    pub total_units: u32,
    pub price: Price,
    pub has_balcony: Option<bool>,
    pub item_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub user_id: UserId,
    pub establishment_id: EstablishmentId,
    pub start_date: NaiveDate,
    /// Nights; `None` means one night.
    pub duration: Option<u32>,
    pub item_type: String,
    pub floor_area: Option<String>,
    pub num_guests: Option<u32>,
}

// ── WAL records ──────────────────────────────────────────────────

/// Flat event log. Ledger counters are never logged; they follow from
/// `InventoryUpserted` plus the `ledger_nights` carried by booking events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        id: UserId,
        email: String,
        role: UserRole,
    },
    EstablishmentCreated {
        establishment: Establishment,
    },
    EstablishmentAvailabilitySet {
        id: EstablishmentId,
        available: bool,
    },
    EstablishmentDeleted {
        id: EstablishmentId,
    },
    UnitTypeAdded {
        unit_type: UnitType,
    },
    UnitTypeActiveSet {
        id: Ulid,
        establishment_id: EstablishmentId,
        active: bool,
    },
    InventoryUpserted {
        id: Ulid,
        establishment_id: EstablishmentId,
        date: NaiveDate,
        item_type: String,
        floor_area: Option<String>,
        total_units: u32,
        price: Price,
        has_balcony: Option<bool>,
        item_image_url: Option<String>,
    },
    /// `booking.counted_nights` are incremented on apply.
    BookingCreated {
        booking: Booking,
    },
    /// Entering CONFIRMED increments `ledger_nights`; entering CANCELLED
    /// releases whatever the booking currently holds.
    BookingStatusChanged {
        id: Ulid,
        establishment_id: EstablishmentId,
        status: BookingStatus,
        ledger_nights: Vec<LedgerNight>,
    },
}

impl Event {
    /// The establishment whose lock must be held to apply this event.
    pub fn establishment_id(&self) -> Option<&str> {
        match self {
            Event::UserRegistered { .. } => None,
            Event::EstablishmentCreated { establishment } => Some(&establishment.id),
            Event::EstablishmentAvailabilitySet { id, .. } | Event::EstablishmentDeleted { id } => Some(id),
            Event::UnitTypeAdded { unit_type } => Some(&unit_type.establishment_id),
            Event::UnitTypeActiveSet { establishment_id, .. }
            | Event::InventoryUpserted { establishment_id, .. }
            | Event::BookingStatusChanged { establishment_id, .. } => Some(establishment_id),
            Event::BookingCreated { booking } => Some(&booking.establishment_id),
        }
    }
}
