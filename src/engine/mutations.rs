use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{error, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::availability::AvailabilityProvider;
use super::conflict::{check_capacity, check_guests, check_ledger, quote, resolve_item, stay_for};
use super::{Engine, EngineError, WalCommand};

fn require_text(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// A confirmed booking whose ledger rows are missing is kept, but it must be seen.
fn report_missing_nights(booking: &Booking, missing: &[NaiveDate]) {
    if missing.is_empty() {
        return;
    }
    metrics::counter!(observability::LEDGER_INCONSISTENCIES_TOTAL).increment(missing.len() as u64);
    error!(
        booking_id = %booking.id,
        establishment_id = %booking.establishment_id,
        item_type = %booking.booked_item_type,
        nights = ?missing,
        "booking confirmed with no ledger row for some nights; counters not incremented"
    );
}

impl Engine {
    pub async fn register_user(&self, id: UserId, email: &str, role: UserRole) -> Result<User, EngineError> {
        require_text("email", email)?;
        let _gate = self.compaction_gate.read().await;
        if self.store.contains_user(id) {
            return Err(EngineError::AlreadyExists(format!("user {id}")));
        }
        let event = Event::UserRegistered {
            id,
            email: email.trim().to_string(),
            role,
        };
        self.persist_global(&event).await?;
        self.require_user(id)
    }

    pub async fn create_establishment(&self, req: NewEstablishment) -> Result<Establishment, EngineError> {
        require_text("name", &req.name)?;
        if req.star_rating > 5 {
            return Err(EngineError::Validation(format!(
                "star_rating must be between 0 and 5, got {}",
                req.star_rating
            )));
        }
        self.require_partner(req.owner_id)?;
        let id = match req.id {
            Some(id) => {
                require_text("id", &id)?;
                id.trim().to_string()
            }
            None => Ulid::new().to_string(),
        };

        let _gate = self.compaction_gate.read().await;
        if self.store.contains_establishment(&id) {
            return Err(EngineError::AlreadyExists(format!("establishment {id}")));
        }
        let establishment = Establishment {
            id,
            owner_id: req.owner_id,
            name: req.name.trim().to_string(),
            kind: req.kind,
            city: req.city.trim().to_string(),
            address: req.address,
            amenities: req.amenities,
            star_rating: req.star_rating,
            image_url_main: req.image_url_main,
            image_urls_gallery: req.image_urls_gallery,
            available: true,
            has_inventory: req.has_inventory,
        };
        let event = Event::EstablishmentCreated {
            establishment: establishment.clone(),
        };
        self.persist_global(&event).await?;
        info!(establishment_id = %establishment.id, owner_id = establishment.owner_id, "establishment created");
        Ok(establishment)
    }

    pub async fn set_establishment_available(&self, id: &str, available: bool) -> Result<Establishment, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.establishment_write(id).await?;
        if guard.info.available != available {
            let event = Event::EstablishmentAvailabilitySet {
                id: id.to_string(),
                available,
            };
            self.persist_and_apply(&mut guard, &event).await?;
        }
        Ok(guard.info.clone())
    }

    /// Refused while any pending or confirmed booking references the establishment.
    pub async fn delete_establishment(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let guard = self.establishment_write(id).await?;
        if guard.has_active_bookings() {
            return Err(EngineError::HasActiveBookings(id.to_string()));
        }
        self.wal_append(&Event::EstablishmentDeleted { id: id.to_string() })
            .await?;
        self.store.remove_establishment(&guard);
        info!(establishment_id = id, "establishment deleted");
        Ok(())
    }

    pub async fn add_unit_type(&self, req: NewUnitType) -> Result<UnitType, EngineError> {
        require_text("code", &req.code)?;
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.establishment_write(&req.establishment_id).await?;
        if guard.unit_types.iter().any(|u| same_item(&u.code, &req.code)) {
            return Err(EngineError::AlreadyExists(format!(
                "unit type '{}' in establishment {}",
                req.code.trim(),
                req.establishment_id
            )));
        }
        let unit_type = UnitType {
            id: Ulid::new(),
            establishment_id: req.establishment_id,
            category: req.category,
            code: req.code.trim().to_string(),
            name: req.name.trim().to_string(),
            capacity: req.capacity,
            has_balcony: req.has_balcony,
            base_price: req.base_price,
            total_units: req.total_units,
            active: true,
        };
        let event = Event::UnitTypeAdded {
            unit_type: unit_type.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(unit_type)
    }

    pub async fn set_unit_type_active(&self, id: Ulid, active: bool) -> Result<UnitType, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.unit_type_write(&id).await?;
        let current = guard
            .unit_type(&id)
            .ok_or_else(|| EngineError::NotFound(format!("unit type {id}")))?;
        if current.active != active {
            let event = Event::UnitTypeActiveSet {
                id,
                establishment_id: guard.info.id.clone(),
                active,
            };
            self.persist_and_apply(&mut guard, &event).await?;
        }
        guard
            .unit_type(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("unit type {id}")))
    }

    /// Create or update the ledger row for one night. The booked counter of an
    /// existing row is left alone, and the new total may not drop below it.
    pub async fn upsert_inventory(&self, req: InventoryUpsert) -> Result<InventoryDay, EngineError> {
        require_text("item_type", &req.item_type)?;
        if req.price < 0 {
            return Err(EngineError::Validation(format!("price must not be negative, got {}", req.price)));
        }
        self.require_partner(req.owner_id)?;

        let _gate = self.compaction_gate.read().await;
        let mut guard = self.establishment_write(&req.establishment_id).await?;
        if guard.info.owner_id != req.owner_id {
            return Err(EngineError::Forbidden(format!(
                "user {} does not own establishment {}",
                req.owner_id, req.establishment_id
            )));
        }
        let existing = guard.ledger_row(req.date, &req.item_type);
        if let Some(row) = existing
            && row.units_booked > req.total_units
        {
            return Err(EngineError::Validation(format!(
                "total_units {} for '{}' on {} is below the {} units already booked",
                req.total_units, row.item_type, req.date, row.units_booked
            )));
        }
        let id = existing.map(|row| row.id).unwrap_or_else(Ulid::new);
        let event = Event::InventoryUpserted {
            id,
            establishment_id: req.establishment_id.clone(),
            date: req.date,
            item_type: req.item_type.trim().to_string(),
            floor_area: req.floor_area,
            total_units: req.total_units,
            price: req.price,
            has_balcony: req.has_balcony,
            item_image_url: req.item_image_url,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard
            .ledger_row(req.date, &req.item_type)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("inventory for '{}' on {}", req.item_type, req.date)))
    }

    /// Reserve one unit. The overlap count, the ledger check and both WAL
    /// appends run under the establishment's write lock, so two requests for
    /// the last unit cannot both succeed.
    pub async fn reserve(&self, req: ReservationRequest) -> Result<Booking, EngineError> {
        let result = self.reserve_locked(req).await;
        let outcome = match &result {
            Ok(_) => "confirmed",
            Err(e) => e.outcome(),
        };
        metrics::counter!(observability::RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn reserve_locked(&self, req: ReservationRequest) -> Result<Booking, EngineError> {
        let span = stay_for(req.start_date, req.duration)?;
        self.require_user(req.user_id)?;

        let _gate = self.compaction_gate.read().await;
        let mut guard = self.establishment_write(&req.establishment_id).await?;
        if !guard.info.available {
            return Err(EngineError::EstablishmentClosed(req.establishment_id));
        }
        let provider = AvailabilityProvider::for_establishment(&guard.info);
        let item = resolve_item(&guard, &req.item_type, span.start)?;
        check_guests(&item, req.num_guests)?;
        check_capacity(&guard, &item, &span, None)?;
        let booked_item_type = req.item_type.trim().to_string();
        let ledger = check_ledger(&guard, provider, &item, &booked_item_type, &span)?;
        let total_price = quote(&guard, &item, &booked_item_type, &span)?;

        let booking = Booking {
            id: Ulid::new(),
            user_id: req.user_id,
            establishment_id: req.establishment_id.clone(),
            partner_id: guard.info.owner_id,
            start_date: span.start,
            duration: span.nights() as u32,
            total_price,
            status: BookingStatus::PendingPayment,
            booked_item_type,
            booked_floor_area: req.floor_area,
            num_guests: req.num_guests,
            counted_nights: Vec::new(),
        };
        let id = booking.id;
        self.persist_and_apply(&mut guard, &Event::BookingCreated { booking })
            .await?;

        // Payment is a single simulated step.
        let confirm = Event::BookingStatusChanged {
            id,
            establishment_id: req.establishment_id,
            status: BookingStatus::Confirmed,
            ledger_nights: ledger.counted,
        };
        self.persist_and_apply(&mut guard, &confirm).await?;

        let booking = guard
            .booking(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("booking {id}")))?;
        report_missing_nights(&booking, &ledger.missing);
        info!(
            booking_id = %booking.id,
            establishment_id = %booking.establishment_id,
            item_type = %booking.booked_item_type,
            nights = booking.duration,
            "booking confirmed"
        );
        Ok(booking)
    }

    /// Apply a status transition. Repeating the current status is a no-op;
    /// reconfirming re-runs the capacity and ledger checks.
    pub async fn update_booking_status(&self, id: Ulid, status: BookingStatus) -> Result<Booking, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.booking_write(&id).await?;
        let booking = guard
            .booking(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("booking {id}")))?;
        if booking.status == status {
            return Ok(booking);
        }
        if !booking.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                id,
                from: booking.status,
                to: status,
            });
        }

        let mut missing = Vec::new();
        let ledger_nights = match status {
            BookingStatus::Confirmed => {
                let span = booking.span();
                let provider = AvailabilityProvider::for_establishment(&guard.info);
                let item = resolve_item(&guard, &booking.booked_item_type, span.start)?;
                check_capacity(&guard, &item, &span, Some(id))?;
                let ledger = check_ledger(&guard, provider, &item, &booking.booked_item_type, &span)?;
                missing = ledger.missing;
                ledger.counted
            }
            _ => Vec::new(),
        };
        let event = Event::BookingStatusChanged {
            id,
            establishment_id: booking.establishment_id.clone(),
            status,
            ledger_nights,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let updated = guard
            .booking(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("booking {id}")))?;
        report_missing_nights(&updated, &missing);
        info!(booking_id = %id, from = %booking.status, to = %status, "booking status changed");
        Ok(updated)
    }

    /// Rewrite the WAL with the minimal event set that recreates current state.
    /// Ledger counters are reproduced by replaying each booking's held nights.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;
        let mut events: Vec<Event> = self
            .store
            .users()
            .into_iter()
            .map(|u| Event::UserRegistered {
                id: u.id,
                email: u.email,
                role: u.role,
            })
            .collect();

        for (_, shared) in self.store.establishments() {
            let es = shared.read().await;
            events.push(Event::EstablishmentCreated {
                establishment: es.info.clone(),
            });
            events.extend(es.unit_types.iter().map(|u| Event::UnitTypeAdded { unit_type: u.clone() }));
            events.extend(es.inventory.values().map(|row| Event::InventoryUpserted {
                id: row.id,
                establishment_id: row.establishment_id.clone(),
                date: row.date,
                item_type: row.item_type.clone(),
                floor_area: row.floor_area.clone(),
                total_units: row.total_units,
                price: row.price,
                has_balcony: row.has_balcony,
                item_image_url: row.item_image_url.clone(),
            }));
            events.extend(es.bookings.iter().map(|b| Event::BookingCreated { booking: b.clone() }));
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
