use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::warn;
use ulid::Ulid;

use crate::model::*;

use super::SharedEstablishmentState;

/// Shared maps behind the engine: establishments, users, and the reverse
/// indexes that route a booking or unit type id to its establishment lock.
pub struct InMemoryStore {
    establishments: DashMap<EstablishmentId, SharedEstablishmentState>,
    users: DashMap<UserId, User>,
    booking_index: DashMap<Ulid, EstablishmentId>,
    unit_type_index: DashMap<Ulid, EstablishmentId>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            establishments: DashMap::new(),
            users: DashMap::new(),
            booking_index: DashMap::new(),
            unit_type_index: DashMap::new(),
        }
    }

    // ── Establishments ───────────────────────────────────────

    pub fn establishment_count(&self) -> usize {
        self.establishments.len()
    }

    pub fn contains_establishment(&self, id: &str) -> bool {
        self.establishments.contains_key(id)
    }

    pub fn get_establishment(&self, id: &str) -> Option<SharedEstablishmentState> {
        self.establishments.get(id).map(|e| e.value().clone())
    }

    pub fn insert_establishment(&self, info: Establishment) {
        let id = info.id.clone();
        self.establishments
            .insert(id, Arc::new(RwLock::new(EstablishmentState::new(info))));
    }

    /// Drop the establishment and every index entry pointing into it.
    /// The caller passes the (locked) state it is removing.
    pub fn remove_establishment(&self, es: &EstablishmentState) {
        for b in &es.bookings {
            self.booking_index.remove(&b.id);
        }
        for u in &es.unit_types {
            self.unit_type_index.remove(&u.id);
        }
        self.establishments.remove(&es.info.id);
    }

    /// Snapshot of all establishment handles, in id order so scans are stable.
    pub fn establishments(&self) -> Vec<(EstablishmentId, SharedEstablishmentState)> {
        let mut all: Vec<_> = self
            .establishments
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    // ── Users ────────────────────────────────────────────────

    pub fn get_user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    pub fn contains_user(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }

    pub fn users(&self) -> Vec<User> {
        let mut all: Vec<_> = self.users.iter().map(|u| u.value().clone()).collect();
        all.sort_by_key(|u| u.id);
        all
    }

    // ── Entity index ─────────────────────────────────────────

    pub fn establishment_for_booking(&self, id: &Ulid) -> Option<EstablishmentId> {
        self.booking_index.get(id).map(|e| e.value().clone())
    }

    pub fn establishment_for_unit_type(&self, id: &Ulid) -> Option<EstablishmentId> {
        self.unit_type_index.get(id).map(|e| e.value().clone())
    }

    // ── Event application ────────────────────────────────────

    /// Events that touch no establishment lock.
    pub fn apply_global(&self, event: &Event) {
        match event {
            Event::UserRegistered { id, email, role } => {
                self.users.insert(
                    *id,
                    User {
                        id: *id,
                        email: email.clone(),
                        role: *role,
                    },
                );
            }
            Event::EstablishmentCreated { establishment } => {
                self.insert_establishment(establishment.clone());
            }
            _ => {}
        }
    }

    /// Apply an establishment-scoped event. The caller holds the write lock.
    pub fn apply_event(&self, es: &mut EstablishmentState, event: &Event) {
        match event {
            Event::EstablishmentAvailabilitySet { available, .. } => {
                es.info.available = *available;
            }
            Event::UnitTypeAdded { unit_type } => {
                self.unit_type_index
                    .insert(unit_type.id, unit_type.establishment_id.clone());
                es.unit_types.push(unit_type.clone());
            }
            Event::UnitTypeActiveSet { id, active, .. } => {
                if let Some(ut) = es.unit_type_mut(id) {
                    ut.active = *active;
                }
            }
            Event::InventoryUpserted {
                id,
                establishment_id,
                date,
                item_type,
                floor_area,
                total_units,
                price,
                has_balcony,
                item_image_url,
            } => match es.ledger_row_mut(*date, item_type) {
                // Existing rows keep their booked counter.
                Some(row) => {
                    row.floor_area = floor_area.clone();
                    row.total_units = *total_units;
                    row.price = *price;
                    row.has_balcony = *has_balcony;
                    row.item_image_url = item_image_url.clone();
                }
                None => es.upsert_ledger_row(InventoryDay {
                    id: *id,
                    establishment_id: establishment_id.clone(),
                    date: *date,
                    item_type: item_type.clone(),
                    floor_area: floor_area.clone(),
                    total_units: *total_units,
                    units_booked: 0,
                    price: *price,
                    has_balcony: *has_balcony,
                    item_image_url: item_image_url.clone(),
                }),
            },
            Event::BookingCreated { booking } => {
                increment_nights(es, &booking.counted_nights);
                self.booking_index
                    .insert(booking.id, booking.establishment_id.clone());
                es.insert_booking(booking.clone());
            }
            Event::BookingStatusChanged {
                id,
                status,
                ledger_nights,
                ..
            } => {
                let Some(booking) = es.booking(id) else {
                    warn!(booking_id = %id, "status change for unknown booking ignored");
                    return;
                };
                if booking.status == *status {
                    return;
                }
                match status {
                    BookingStatus::Confirmed => {
                        increment_nights(es, ledger_nights);
                        if let Some(b) = es.booking_mut(id) {
                            b.counted_nights = ledger_nights.clone();
                        }
                    }
                    BookingStatus::Cancelled => {
                        let held = es
                            .booking_mut(id)
                            .map(|b| std::mem::take(&mut b.counted_nights))
                            .unwrap_or_default();
                        decrement_nights(es, &held);
                    }
                    BookingStatus::PendingPayment => {}
                }
                if let Some(b) = es.booking_mut(id) {
                    b.status = *status;
                }
            }
            Event::UserRegistered { .. }
            | Event::EstablishmentCreated { .. }
            | Event::EstablishmentDeleted { .. } => {}
        }
    }

    /// Rebuild state from a replayed log. Locks are uncontended here, so
    /// `try_write` always succeeds.
    pub fn replay(&self, events: &[Event]) {
        for event in events {
            match event {
                Event::UserRegistered { .. } | Event::EstablishmentCreated { .. } => {
                    self.apply_global(event);
                }
                Event::EstablishmentDeleted { id } => {
                    if let Some(shared) = self.get_establishment(id)
                        && let Ok(guard) = shared.try_read()
                    {
                        self.remove_establishment(&guard);
                    }
                }
                other => {
                    let Some(id) = other.establishment_id() else { continue };
                    match self.get_establishment(id) {
                        Some(shared) => match shared.try_write() {
                            Ok(mut guard) => self.apply_event(&mut guard, other),
                            Err(_) => warn!(establishment_id = id, "replay: establishment locked, event skipped"),
                        },
                        None => warn!(establishment_id = id, "replay: event for unknown establishment skipped"),
                    }
                }
            }
        }
    }
}

fn increment_nights(es: &mut EstablishmentState, nights: &[LedgerNight]) {
    for night in nights {
        if let Some(row) = es.ledger_row_mut(night.date, &night.item_type) {
            row.units_booked = row.units_booked.saturating_add(1);
        }
    }
}

fn decrement_nights(es: &mut EstablishmentState, nights: &[LedgerNight]) {
    for night in nights {
        if let Some(row) = es.ledger_row_mut(night.date, &night.item_type) {
            row.units_booked = row.units_booked.saturating_sub(1);
        }
    }
}
