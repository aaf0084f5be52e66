use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

/// How an establishment answers "how many units are free tonight?".
/// Chosen once from `has_inventory`; nothing downstream branches on the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityProvider {
    /// Daily ledger rows with explicit booked counters.
    Ledger,
    /// Unit-type capacity minus overlapping active bookings.
    Capacity,
}

impl AvailabilityProvider {
    pub fn for_establishment(info: &Establishment) -> Self {
        if info.has_inventory {
            AvailabilityProvider::Ledger
        } else {
            AvailabilityProvider::Capacity
        }
    }

    /// Offers for the night of `date`. Ledger rows with nothing left are
    /// dropped; capacity offers are listed even when fully booked.
    pub fn offers_on(self, es: &EstablishmentState, date: NaiveDate) -> Vec<Offer> {
        match self {
            AvailabilityProvider::Ledger => es
                .ledger_rows_on(date)
                .filter(|row| row.units_available() > 0)
                .map(|row| ledger_offer(&es.info, row))
                .collect(),
            AvailabilityProvider::Capacity => es
                .unit_types
                .iter()
                .filter(|ut| ut.active)
                .map(|ut| {
                    let booked = booked_on_night(es, ut, date);
                    capacity_offer(&es.info, ut, ut.unit_capacity().saturating_sub(booked))
                })
                .collect(),
        }
    }
}

/// Active bookings of `ut` that occupy the night of `date`.
pub(crate) fn booked_on_night(es: &EstablishmentState, ut: &UnitType, date: NaiveDate) -> u32 {
    es.bookings
        .iter()
        .filter(|b| b.status.is_active())
        .filter(|b| b.span().contains_night(date))
        .filter(|b| ut.answers_to(&b.booked_item_type))
        .count() as u32
}

/// Active bookings matching `item` whose stay overlaps `span`, except `exclude`.
pub(crate) fn count_active_overlaps(
    es: &EstablishmentState,
    matches_item: impl Fn(&str) -> bool,
    span: &DateSpan,
    exclude: Option<Ulid>,
) -> u32 {
    es.overlapping(span)
        .filter(|b| b.status.is_active())
        .filter(|b| Some(b.id) != exclude)
        .filter(|b| matches_item(&b.booked_item_type))
        .count() as u32
}

fn ledger_offer(info: &Establishment, row: &InventoryDay) -> Offer {
    Offer {
        establishment_id: info.id.clone(),
        establishment_name: info.name.clone(),
        city: info.city.clone(),
        star_rating: info.star_rating,
        image_url_main: info.image_url_main.clone(),
        image_urls_gallery: info.image_urls_gallery.clone(),
        item_type: row.item_type.clone(),
        floor_area: row.floor_area.clone(),
        units_available: row.units_available(),
        final_price: Some(row.price),
        item_image_url: row.item_image_url.clone(),
        capacity: None,
        has_balcony: row.has_balcony,
    }
}

fn capacity_offer(info: &Establishment, ut: &UnitType, units_available: u32) -> Offer {
    Offer {
        establishment_id: info.id.clone(),
        establishment_name: info.name.clone(),
        city: info.city.clone(),
        star_rating: info.star_rating,
        image_url_main: info.image_url_main.clone(),
        image_urls_gallery: info.image_urls_gallery.clone(),
        item_type: ut.label().to_string(),
        floor_area: None,
        units_available,
        final_price: ut.base_price,
        item_image_url: None,
        capacity: ut.capacity,
        has_balcony: ut.has_balcony,
    }
}
