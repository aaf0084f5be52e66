use std::cmp::Reverse;

use crate::model::Offer;
use crate::params::SearchParams;

/// +3 when something is left, +2 within budget, +1 per priority amenity
/// named in the item type.
pub fn score(offer: &Offer, params: &SearchParams) -> u32 {
    let mut score = 0;
    if offer.units_available > 0 {
        score += 3;
    }
    if offer.final_price.is_some_and(|p| p <= params.max_price) {
        score += 2;
    }
    let item = offer.item_type.to_lowercase();
    score += params
        .amenities
        .iter()
        .filter(|a| !a.is_empty() && item.contains(a.as_str()))
        .count() as u32;
    score
}

/// Highest score first. Equal scores keep their input order and nothing
/// else; the order is stable, not total.
pub fn rank(offers: &mut [Offer], params: &SearchParams) {
    offers.sort_by_cached_key(|o| Reverse(score(o, params)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(item: &str, units: u32, price: i64) -> Offer {
        Offer {
            establishment_id: "h1".into(),
            establishment_name: "Sea Breeze".into(),
            city: "Đà Nẵng".into(),
            star_rating: 4,
            image_url_main: None,
            image_urls_gallery: vec![],
            item_type: item.into(),
            floor_area: None,
            units_available: units,
            final_price: Some(price),
            item_image_url: None,
            capacity: None,
            has_balcony: None,
        }
    }

    fn params(amenities: &[&str]) -> SearchParams {
        let mut p = SearchParams::new("2025-06-01".parse().unwrap(), 1_000);
        p.amenities = amenities.iter().map(|a| a.to_string()).collect();
        p
    }

    #[test]
    fn score_components() {
        let p = params(&["ocean", "view"]);
        assert_eq!(score(&offer("Ocean View Suite", 1, 900), &p), 3 + 2 + 2);
        assert_eq!(score(&offer("Ocean View Suite", 0, 900), &p), 2 + 2);
        assert_eq!(score(&offer("Garden Room", 1, 5_000), &p), 3);
    }

    #[test]
    fn sold_out_never_outranks_identical_available() {
        let p = params(&[]);
        let mut offers = vec![offer("Double", 0, 500), offer("Double", 2, 500)];
        rank(&mut offers, &p);
        assert_eq!(offers[0].units_available, 2);
    }

    #[test]
    fn ties_keep_input_order() {
        let p = params(&[]);
        let mut offers = vec![offer("B", 1, 10), offer("A", 1, 10), offer("C", 1, 5_000)];
        rank(&mut offers, &p);
        let order: Vec<_> = offers.iter().map(|o| o.item_type.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }
}
