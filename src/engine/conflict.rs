use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::availability::{AvailabilityProvider, count_active_overlaps};

/// The bookable thing a reservation request names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResolvedItem {
    UnitType(UnitType),
    /// Ledger-only item type with no unit type behind it.
    LedgerItem { item_type: String, price: Price },
}

impl ResolvedItem {
    pub fn label(&self) -> &str {
        match self {
            ResolvedItem::UnitType(ut) => ut.label(),
            ResolvedItem::LedgerItem { item_type, .. } => item_type,
        }
    }

    /// Concurrent units; ledger-only items are bounded by the ledger instead.
    pub fn capacity(&self) -> u32 {
        match self {
            ResolvedItem::UnitType(ut) => ut.unit_capacity(),
            ResolvedItem::LedgerItem { .. } => UNLIMITED_UNITS,
        }
    }

    pub fn matches(&self, booked_item_type: &str) -> bool {
        match self {
            ResolvedItem::UnitType(ut) => ut.answers_to(booked_item_type),
            ResolvedItem::LedgerItem { item_type, .. } => same_item(item_type, booked_item_type),
        }
    }

    /// The ledger row this item books on `night`. The requested spelling wins,
    /// then the unit type's code and name, so a row keyed by either is found.
    pub fn ledger_row<'a>(
        &self,
        es: &'a EstablishmentState,
        requested: &str,
        night: NaiveDate,
    ) -> Option<&'a InventoryDay> {
        es.ledger_row(night, requested).or_else(|| match self {
            ResolvedItem::UnitType(ut) => es
                .ledger_row(night, &ut.code)
                .or_else(|| es.ledger_row(night, &ut.name)),
            ResolvedItem::LedgerItem { item_type, .. } => es.ledger_row(night, item_type),
        })
    }

    fn guest_capacity(&self) -> Option<u32> {
        match self {
            ResolvedItem::UnitType(ut) => ut.capacity.filter(|c| *c > 0),
            ResolvedItem::LedgerItem { .. } => None,
        }
    }
}

/// Ledger nights a reservation will hold, and nights whose row is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LedgerNights {
    pub counted: Vec<LedgerNight>,
    pub missing: Vec<NaiveDate>,
}

/// Longest stay a single booking may cover.
pub(crate) const MAX_STAY_NIGHTS: u32 = 365;

pub(crate) fn stay_for(start: NaiveDate, duration: Option<u32>) -> Result<DateSpan, EngineError> {
    let nights = duration.unwrap_or(1);
    if nights == 0 {
        return Err(EngineError::Validation("duration must be at least one night".into()));
    }
    if nights > MAX_STAY_NIGHTS {
        return Err(EngineError::Validation(format!(
            "duration of {nights} nights exceeds the {MAX_STAY_NIGHTS}-night limit"
        )));
    }
    DateSpan::stay(start, nights)
        .ok_or_else(|| EngineError::Validation(format!("stay of {nights} nights from {start} is out of range")))
}

/// Active unit type by code or name; otherwise a ledger row for the first night.
pub(crate) fn resolve_item(
    es: &EstablishmentState,
    item: &str,
    start: NaiveDate,
) -> Result<ResolvedItem, EngineError> {
    if item.trim().is_empty() {
        return Err(EngineError::Validation("item type is required".into()));
    }
    if let Some(ut) = es.active_unit_type(item) {
        return Ok(ResolvedItem::UnitType(ut.clone()));
    }
    if let Some(row) = es.ledger_row(start, item) {
        return Ok(ResolvedItem::LedgerItem {
            item_type: row.item_type.clone(),
            price: row.price,
        });
    }
    Err(EngineError::UnknownItemType(item.trim().to_string()))
}

pub(crate) fn check_guests(item: &ResolvedItem, num_guests: Option<u32>) -> Result<(), EngineError> {
    match (num_guests, item.guest_capacity()) {
        (Some(0), _) => Err(EngineError::Validation("num_guests must be positive".into())),
        (Some(guests), Some(cap)) if guests > cap => Err(EngineError::Validation(format!(
            "'{}' sleeps {cap}, {guests} guests requested",
            item.label()
        ))),
        _ => Ok(()),
    }
}

/// Reject when the overlapping active bookings of this item already fill it.
pub(crate) fn check_capacity(
    es: &EstablishmentState,
    item: &ResolvedItem,
    span: &DateSpan,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let capacity = item.capacity();
    if capacity == UNLIMITED_UNITS {
        return Ok(());
    }
    let taken = count_active_overlaps(es, |booked| item.matches(booked), span, exclude);
    if taken >= capacity {
        return Err(EngineError::CapacityExceeded {
            item_type: item.label().to_string(),
            capacity,
            night: None,
        });
    }
    Ok(())
}

/// Every ledger night must still have room; missing rows are reported, not rejected.
pub(crate) fn check_ledger(
    es: &EstablishmentState,
    provider: AvailabilityProvider,
    item: &ResolvedItem,
    booked_item_type: &str,
    span: &DateSpan,
) -> Result<LedgerNights, EngineError> {
    let mut nights = LedgerNights::default();
    if provider != AvailabilityProvider::Ledger {
        return Ok(nights);
    }
    for night in span.each_night() {
        match item.ledger_row(es, booked_item_type, night) {
            Some(row) if !row.has_room() => {
                return Err(EngineError::CapacityExceeded {
                    item_type: row.item_type.clone(),
                    capacity: row.total_units,
                    night: Some(night),
                });
            }
            Some(row) => nights.counted.push(LedgerNight {
                date: night,
                item_type: row.item_type.clone(),
            }),
            None => nights.missing.push(night),
        }
    }
    Ok(nights)
}

/// Nightly price times nights. Unit types without a base price fall back
/// to the first night's ledger price.
pub(crate) fn quote(
    es: &EstablishmentState,
    item: &ResolvedItem,
    booked_item_type: &str,
    span: &DateSpan,
) -> Result<Price, EngineError> {
    let nightly = match item {
        ResolvedItem::UnitType(ut) => ut
            .base_price
            .or_else(|| item.ledger_row(es, booked_item_type, span.start).map(|r| r.price)),
        ResolvedItem::LedgerItem { price, .. } => Some(*price),
    };
    let nightly =
        nightly.ok_or_else(|| EngineError::Validation(format!("no price configured for '{}'", item.label())))?;
    Ok(nightly.saturating_mul(span.nights()))
}
