use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::AvailabilityProvider;
use super::{Engine, EngineError};

impl Engine {
    /// Offers for one establishment on one night, closed or not.
    pub async fn availability_on(&self, establishment_id: &str, date: NaiveDate) -> Result<Vec<Offer>, EngineError> {
        let shared = self.establishment(establishment_id)?;
        let es = shared.read().await;
        Ok(AvailabilityProvider::for_establishment(&es.info).offers_on(&es, date))
    }

    pub async fn get_establishment(&self, id: &str) -> Result<Establishment, EngineError> {
        let shared = self.establishment(id)?;
        let es = shared.read().await;
        Ok(es.info.clone())
    }

    pub async fn unit_types_of(&self, establishment_id: &str) -> Result<Vec<UnitType>, EngineError> {
        let shared = self.establishment(establishment_id)?;
        let es = shared.read().await;
        Ok(es.unit_types.clone())
    }

    pub async fn ledger_row(
        &self,
        establishment_id: &str,
        date: NaiveDate,
        item_type: &str,
    ) -> Result<Option<InventoryDay>, EngineError> {
        let shared = self.establishment(establishment_id)?;
        let es = shared.read().await;
        Ok(es.ledger_row(date, item_type).cloned())
    }

    pub async fn get_booking(&self, id: &Ulid) -> Result<Booking, EngineError> {
        let establishment_id = self
            .store
            .establishment_for_booking(id)
            .ok_or_else(|| EngineError::NotFound(format!("booking {id}")))?;
        let shared = self.establishment(&establishment_id)?;
        let es = shared.read().await;
        es.booking(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("booking {id}")))
    }

    /// A guest's booking history, oldest stay first.
    pub async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, EngineError> {
        self.require_user(user_id)?;
        let mut out = Vec::new();
        for (_, shared) in self.store.establishments() {
            let es = shared.read().await;
            out.extend(es.bookings.iter().filter(|b| b.user_id == user_id).cloned());
        }
        out.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Bookings across every establishment the partner owns.
    pub async fn bookings_for_partner(&self, partner_id: UserId) -> Result<Vec<Booking>, EngineError> {
        self.require_partner(partner_id)?;
        let mut out = Vec::new();
        for (_, shared) in self.store.establishments() {
            let es = shared.read().await;
            if es.info.owner_id == partner_id {
                out.extend(es.bookings.iter().cloned());
            }
        }
        out.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    pub async fn establishments_for_owner(&self, owner_id: UserId) -> Result<Vec<Establishment>, EngineError> {
        self.require_partner(owner_id)?;
        let mut out = Vec::new();
        for (_, shared) in self.store.establishments() {
            let es = shared.read().await;
            if es.info.owner_id == owner_id {
                out.push(es.info.clone());
            }
        }
        Ok(out)
    }
}
