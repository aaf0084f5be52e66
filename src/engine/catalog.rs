use std::collections::HashSet;

use tracing::debug;

use crate::model::*;
use crate::params::SearchParams;

use super::availability::AvailabilityProvider;
use super::{Engine, SharedEstablishmentState};

/// Does an offer's label hint at a room sized for `guests`?
/// Party sizes without a keyword rule accept everything.
pub fn suggests_party_size(item_type: &str, floor_area: Option<&str>, guests: u32) -> bool {
    let label = match floor_area {
        Some(area) => format!("{item_type} {area}"),
        None => item_type.to_string(),
    }
    .to_lowercase();
    let any = |keys: &[&str]| keys.iter().any(|k| label.contains(k));
    match guests {
        2 => any(&["double", "2", "đôi", "twin", "couple"]),
        3 => any(&["3", "triple"]),
        4 => any(&["4", "family", "gia đình"]),
        _ => true,
    }
}

fn passes_soft_filters(offer: &Offer, params: &SearchParams) -> bool {
    if let (Some(guests), Some(cap)) = (params.num_guests, offer.capacity)
        && cap > 0
        && cap < guests
    {
        return false;
    }
    if let (Some(wanted), Some(has)) = (params.has_balcony, offer.has_balcony)
        && wanted != has
    {
        return false;
    }
    match offer.final_price {
        Some(price) => price <= params.max_price,
        None => true,
    }
}

impl Engine {
    /// Search candidates for bookable offers on `params.check_in`, best first.
    /// An empty candidate list means "no hint", i.e. scan by city.
    pub async fn search(&self, params: &SearchParams, candidates: &[EstablishmentId]) -> Vec<Offer> {
        let mut offers = self.filter_catalog(params, candidates).await;
        super::rank(&mut offers, params);
        offers
    }

    /// The filter pipeline without ranking. Falls back to a city scan when
    /// the candidate hint yields nothing.
    pub async fn filter_catalog(&self, params: &SearchParams, candidates: &[EstablishmentId]) -> Vec<Offer> {
        let offers = self.run_catalog(params, self.select_sources(candidates)).await;
        if offers.is_empty() && !candidates.is_empty() {
            debug!(candidates = candidates.len(), "candidate hint produced no offers, rescanning by city");
            return self.run_catalog(params, self.select_sources(&[])).await;
        }
        offers
    }

    /// Hinted ids that exist (first occurrence wins), or every establishment.
    fn select_sources(&self, candidates: &[EstablishmentId]) -> Vec<SharedEstablishmentState> {
        if candidates.is_empty() {
            return self.store.establishments().into_iter().map(|(_, es)| es).collect();
        }
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.store.get_establishment(id))
            .collect()
    }

    async fn run_catalog(&self, params: &SearchParams, sources: Vec<SharedEstablishmentState>) -> Vec<Offer> {
        let mut allowed_types: Option<HashSet<EstablishmentId>> = params.establishment_type.map(|_| HashSet::new());
        let mut offers = Vec::new();

        for shared in sources {
            let es = shared.read().await;
            if let Some(city) = &params.city
                && !self.cities.matches(&es.info.city, city)
            {
                continue;
            }
            if let Some(kind) = params.establishment_type {
                if es.info.kind != kind {
                    continue;
                }
                if let Some(allowed) = allowed_types.as_mut() {
                    allowed.insert(es.info.id.clone());
                }
            }
            if !es.info.available {
                continue;
            }
            let provider = AvailabilityProvider::for_establishment(&es.info);
            offers.extend(
                provider
                    .offers_on(&es, params.check_in)
                    .into_iter()
                    .filter(|offer| passes_soft_filters(offer, params)),
            );
        }

        if let Some(guests) = params.num_guests {
            let narrowed: Vec<Offer> = offers
                .iter()
                .filter(|o| suggests_party_size(&o.item_type, o.floor_area.as_deref(), guests))
                .cloned()
                .collect();
            if !narrowed.is_empty() {
                offers = narrowed;
            }
        }

        if let Some(allowed) = allowed_types {
            offers.retain(|o| allowed.contains(&o.establishment_id));
        }
        offers
    }
}
