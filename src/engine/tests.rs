use super::*;
use chrono::NaiveDate;

use crate::params::SearchParams;

const PARTNER: UserId = 7;
const OTHER_PARTNER: UserId = 8;
const GUEST: UserId = 1;
const SECOND_GUEST: UserId = 2;

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("lodgr_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

async fn engine_at(path: PathBuf) -> Engine {
    let engine = Engine::new(path, CityNormalizer::default()).unwrap();
    engine.register_user(PARTNER, "partner@example.com", UserRole::Partner).await.unwrap();
    engine
        .register_user(OTHER_PARTNER, "rival@example.com", UserRole::Partner)
        .await
        .unwrap();
    engine.register_user(GUEST, "guest@example.com", UserRole::Customer).await.unwrap();
    engine
        .register_user(SECOND_GUEST, "guest2@example.com", UserRole::Customer)
        .await
        .unwrap();
    engine
}

async fn setup(name: &str) -> Engine {
    engine_at(test_wal_path(name)).await
}

fn new_establishment(id: &str, city: &str, kind: EstablishmentType, has_inventory: bool) -> NewEstablishment {
    NewEstablishment {
        id: Some(id.into()),
        owner_id: PARTNER,
        name: format!("Place {id}"),
        kind,
        city: city.into(),
        address: None,
        amenities: vec!["Pool".into()],
        star_rating: 4,
        image_url_main: None,
        image_urls_gallery: vec![],
        has_inventory,
    }
}

async fn hotel(engine: &Engine, id: &str, city: &str, has_inventory: bool) {
    engine
        .create_establishment(new_establishment(id, city, EstablishmentType::Hotel, has_inventory))
        .await
        .unwrap();
}

async fn room(engine: &Engine, est: &str, code: &str, name: &str, total_units: Option<u32>) -> UnitType {
    engine
        .add_unit_type(NewUnitType {
            establishment_id: est.into(),
            category: UnitCategory::Room,
            code: code.into(),
            name: name.into(),
            capacity: Some(2),
            has_balcony: Some(true),
            base_price: Some(500),
            total_units,
        })
        .await
        .unwrap()
}

async fn ledger(engine: &Engine, est: &str, date: &str, item: &str, total: u32, price: Price) -> InventoryDay {
    engine
        .upsert_inventory(InventoryUpsert {
            owner_id: PARTNER,
            establishment_id: est.into(),
            date: d(date),
            item_type: item.into(),
            floor_area: None,
            total_units: total,
            price,
            has_balcony: None,
            item_image_url: None,
        })
        .await
        .unwrap()
}

fn request(user: UserId, est: &str, start: &str, nights: u32, item: &str) -> ReservationRequest {
    ReservationRequest {
        user_id: user,
        establishment_id: est.into(),
        start_date: d(start),
        duration: Some(nights),
        item_type: item.into(),
        floor_area: None,
        num_guests: None,
    }
}

async fn units_booked(engine: &Engine, est: &str, date: &str, item: &str) -> u32 {
    engine
        .ledger_row(est, d(date), item)
        .await
        .unwrap()
        .map(|row| row.units_booked)
        .unwrap_or_default()
}

// ── Reservations: capacity model ─────────────────────────

#[tokio::test]
async fn half_open_overlap_decides_conflicts() {
    let engine = setup("half_open.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", Some(1)).await;

    let first = engine.reserve(request(GUEST, "h1", "2025-06-01", 2, "dlx")).await.unwrap();
    assert_eq!(first.status, BookingStatus::Confirmed);
    assert_eq!(first.total_price, 1000);
    assert_eq!(first.partner_id, PARTNER);

    let err = engine
        .reserve(request(SECOND_GUEST, "h1", "2025-06-02", 2, "Deluxe"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { .. }), "{err}");
    assert!(engine.bookings_for_user(SECOND_GUEST).await.unwrap().is_empty());

    let adjacent = engine
        .reserve(request(SECOND_GUEST, "h1", "2025-06-03", 2, "DLX"))
        .await
        .unwrap();
    assert_eq!(adjacent.start_date, d("2025-06-03"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_goes_to_exactly_one_caller() {
    let engine = Arc::new(setup("last_unit.wal").await);
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", Some(1)).await;

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "DLX")).await
        }));
    }
    let mut won = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(EngineError::CapacityExceeded { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(engine.bookings_for_user(GUEST).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unlimited_when_total_units_unset() {
    let engine = setup("unlimited.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "STD", "Standard", None).await;
    for _ in 0..5 {
        engine.reserve(request(GUEST, "h1", "2025-06-01", 3, "STD")).await.unwrap();
    }
    let offers = engine.availability_on("h1", d("2025-06-02")).await.unwrap();
    assert_eq!(offers[0].units_available, UNLIMITED_UNITS - 5);
}

#[tokio::test]
async fn reservation_rejections() {
    let engine = setup("rejections.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", Some(3)).await;

    let err = engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "Suite")).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownItemType(_)));

    let err = engine.reserve(request(99, "h1", "2025-06-01", 1, "DLX")).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let err = engine.reserve(request(GUEST, "nope", "2025-06-01", 1, "DLX")).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let err = engine.reserve(request(GUEST, "h1", "2025-06-01", 0, "DLX")).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let mut crowded = request(GUEST, "h1", "2025-06-01", 1, "DLX");
    crowded.num_guests = Some(3);
    let err = engine.reserve(crowded).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    engine.set_establishment_available("h1", false).await.unwrap();
    let err = engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "DLX")).await.unwrap_err();
    assert!(matches!(err, EngineError::EstablishmentClosed(_)));

    assert!(engine.bookings_for_user(GUEST).await.unwrap().is_empty());
}

#[tokio::test]
async fn inactive_unit_type_is_not_bookable() {
    let engine = setup("inactive_type.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    let ut = room(&engine, "h1", "DLX", "Deluxe", Some(3)).await;
    let updated = engine.set_unit_type_active(ut.id, false).await.unwrap();
    assert!(!updated.active);

    let err = engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "DLX")).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownItemType(_)));
    assert!(engine.availability_on("h1", d("2025-06-01")).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_unit_type_code_is_rejected() {
    let engine = setup("dup_type.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", Some(3)).await;
    let err = engine
        .add_unit_type(NewUnitType {
            establishment_id: "h1".into(),
            category: UnitCategory::Room,
            code: "dlx".into(),
            name: "Another".into(),
            capacity: None,
            has_balcony: None,
            base_price: None,
            total_units: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
}

// ── Status transitions ───────────────────────────────────

#[tokio::test]
async fn cancel_then_reconfirm_restores_ledger_counter() {
    let engine = setup("cancel_reconfirm.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", true).await;
    ledger(&engine, "h1", "2025-06-01", "Suite", 2, 800).await;
    ledger(&engine, "h1", "2025-06-02", "Suite", 2, 900).await;

    let booking = engine.reserve(request(GUEST, "h1", "2025-06-01", 2, "suite")).await.unwrap();
    assert_eq!(booking.total_price, 1600);
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Suite").await, 1);
    assert_eq!(units_booked(&engine, "h1", "2025-06-02", "Suite").await, 1);

    let cancelled = engine
        .update_booking_status(booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Suite").await, 0);

    // Repeating the same status changes nothing.
    engine
        .update_booking_status(booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(units_booked(&engine, "h1", "2025-06-02", "Suite").await, 0);

    engine
        .update_booking_status(booking.id, BookingStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Suite").await, 1);
    assert_eq!(units_booked(&engine, "h1", "2025-06-02", "Suite").await, 1);
}

#[tokio::test]
async fn invalid_transitions_are_rejected() {
    let engine = setup("invalid_transition.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", Some(1)).await;
    let booking = engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "DLX")).await.unwrap();

    let err = engine
        .update_booking_status(booking.id, BookingStatus::PendingPayment)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    assert_eq!(err.sqlstate(), "55000");

    let err = engine
        .update_booking_status(Ulid::new(), BookingStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn reconfirm_cannot_oversell() {
    let engine = setup("reconfirm_oversell.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", Some(1)).await;

    let first = engine.reserve(request(GUEST, "h1", "2025-06-01", 2, "DLX")).await.unwrap();
    engine
        .update_booking_status(first.id, BookingStatus::Cancelled)
        .await
        .unwrap();
    engine
        .reserve(request(SECOND_GUEST, "h1", "2025-06-02", 1, "DLX"))
        .await
        .unwrap();

    let err = engine
        .update_booking_status(first.id, BookingStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { .. }));
    assert_eq!(engine.get_booking(&first.id).await.unwrap().status, BookingStatus::Cancelled);
}

// ── Reservations: ledger model ───────────────────────────

#[tokio::test]
async fn ledger_never_exceeds_total_units() {
    let engine = setup("ledger_sold_out.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", true).await;
    ledger(&engine, "h1", "2025-06-01", "Suite", 1, 800).await;

    engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "Suite")).await.unwrap();
    let err = engine
        .reserve(request(SECOND_GUEST, "h1", "2025-06-01", 1, "Suite"))
        .await
        .unwrap_err();
    match err {
        EngineError::CapacityExceeded { night, .. } => assert_eq!(night, Some(d("2025-06-01"))),
        other => panic!("expected CapacityExceeded, got {other}"),
    }
    let row = engine.ledger_row("h1", d("2025-06-01"), "suite").await.unwrap().unwrap();
    assert_eq!(row.units_booked, 1);
    assert_eq!(row.units_available(), 0);

    // Sold-out ledger rows drop out of the listing.
    assert!(engine.availability_on("h1", d("2025-06-01")).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_ledger_night_keeps_booking() {
    let engine = setup("missing_night.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", true).await;
    ledger(&engine, "h1", "2025-06-01", "Suite", 3, 800).await;

    let booking = engine.reserve(request(GUEST, "h1", "2025-06-01", 2, "Suite")).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(
        booking.counted_nights,
        vec![LedgerNight {
            date: d("2025-06-01"),
            item_type: "Suite".into(),
        }]
    );
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Suite").await, 1);

    // A row added later was never counted, so cancelling leaves it alone.
    ledger(&engine, "h1", "2025-06-02", "Suite", 3, 800).await;
    engine
        .update_booking_status(booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Suite").await, 0);
    assert_eq!(units_booked(&engine, "h1", "2025-06-02", "Suite").await, 0);
}

#[tokio::test]
async fn upsert_keeps_booked_counter_and_checks_owner() {
    let engine = setup("upsert.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", true).await;
    let first = ledger(&engine, "h1", "2025-06-01", "Suite", 2, 800).await;
    engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "Suite")).await.unwrap();

    let updated = ledger(&engine, "h1", "2025-06-01", "SUITE", 5, 950).await;
    assert_eq!(updated.id, first.id);
    assert_eq!(updated.units_booked, 1);
    assert_eq!(updated.total_units, 5);
    assert_eq!(updated.price, 950);

    let mut foreign = InventoryUpsert {
        owner_id: OTHER_PARTNER,
        establishment_id: "h1".into(),
        date: d("2025-06-01"),
        item_type: "Suite".into(),
        floor_area: None,
        total_units: 1,
        price: 1,
        has_balcony: None,
        item_image_url: None,
    };
    let err = engine.upsert_inventory(foreign.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    foreign.owner_id = GUEST;
    let err = engine.upsert_inventory(foreign).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn upsert_cannot_shrink_below_booked() {
    let engine = setup("upsert_shrink.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", true).await;
    ledger(&engine, "h1", "2025-06-01", "Suite", 2, 800).await;
    engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "Suite")).await.unwrap();
    engine.reserve(request(SECOND_GUEST, "h1", "2025-06-01", 1, "Suite")).await.unwrap();

    let err = engine
        .upsert_inventory(InventoryUpsert {
            owner_id: PARTNER,
            establishment_id: "h1".into(),
            date: d("2025-06-01"),
            item_type: "Suite".into(),
            floor_area: None,
            total_units: 1,
            price: 800,
            has_balcony: None,
            item_image_url: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{err}");
    let row = engine.ledger_row("h1", d("2025-06-01"), "Suite").await.unwrap().unwrap();
    assert_eq!((row.total_units, row.units_booked), (2, 2));

    // Shrinking to exactly the booked count is allowed.
    let row = ledger(&engine, "h1", "2025-06-01", "Suite", 2, 700).await;
    assert_eq!(row.price, 700);
}

#[tokio::test]
async fn ledger_keyed_by_name_guards_bookings_by_code() {
    let engine = setup("ledger_by_name.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", true).await;
    room(&engine, "h1", "DLX", "Deluxe", None).await;
    ledger(&engine, "h1", "2025-06-01", "Deluxe", 1, 800).await;

    let booking = engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "DLX")).await.unwrap();
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Deluxe").await, 1);

    let err = engine
        .reserve(request(SECOND_GUEST, "h1", "2025-06-01", 1, "DLX"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { night: Some(_), .. }), "{err}");

    engine
        .update_booking_status(booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Deluxe").await, 0);
    engine
        .reserve(request(SECOND_GUEST, "h1", "2025-06-01", 1, "dlx"))
        .await
        .unwrap();
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Deluxe").await, 1);
}

#[tokio::test]
async fn overlong_stay_is_rejected() {
    let engine = setup("overlong.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", None).await;
    let err = engine
        .reserve(request(GUEST, "h1", "2025-06-01", 5_000_000, "DLX"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// ── Listing ──────────────────────────────────────────────

#[tokio::test]
async fn listing_counts_every_occupied_night() {
    let engine = setup("listing_nights.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", Some(2)).await;
    engine.reserve(request(GUEST, "h1", "2025-06-01", 2, "DLX")).await.unwrap();

    let units = |offers: Vec<Offer>| offers[0].units_available;
    assert_eq!(units(engine.availability_on("h1", d("2025-06-01")).await.unwrap()), 1);
    assert_eq!(units(engine.availability_on("h1", d("2025-06-02")).await.unwrap()), 1);
    assert_eq!(units(engine.availability_on("h1", d("2025-06-03")).await.unwrap()), 2);
}

// ── Establishment lifecycle ──────────────────────────────

#[tokio::test]
async fn establishment_rules() {
    let engine = setup("establishment_rules.wal").await;
    let mut req = new_establishment("r1", "Hà Nội", EstablishmentType::Restaurant, false);
    req.owner_id = GUEST;
    assert!(matches!(
        engine.create_establishment(req).await.unwrap_err(),
        EngineError::Forbidden(_)
    ));

    let mut req = new_establishment("r1", "Hà Nội", EstablishmentType::Restaurant, false);
    req.star_rating = 6;
    assert!(matches!(
        engine.create_establishment(req).await.unwrap_err(),
        EngineError::Validation(_)
    ));

    hotel(&engine, "h1", "Đà Nẵng", false).await;
    let err = engine
        .create_establishment(new_establishment("h1", "Huế", EstablishmentType::Hotel, false))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));

    let mut generated = new_establishment("", "Huế", EstablishmentType::Hotel, false);
    generated.id = None;
    let created = engine.create_establishment(generated).await.unwrap();
    assert!(Ulid::from_string(&created.id).is_ok());

    let owned = engine.establishments_for_owner(PARTNER).await.unwrap();
    assert_eq!(owned.len(), 2);
    assert!(matches!(
        engine.establishments_for_owner(GUEST).await.unwrap_err(),
        EngineError::Forbidden(_)
    ));
}

#[tokio::test]
async fn delete_is_guarded_by_active_bookings() {
    let engine = setup("delete_guard.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", Some(1)).await;
    let booking = engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "DLX")).await.unwrap();

    let err = engine.delete_establishment("h1").await.unwrap_err();
    assert!(matches!(err, EngineError::HasActiveBookings(_)));

    engine
        .update_booking_status(booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();
    engine.delete_establishment("h1").await.unwrap();
    assert!(matches!(
        engine.get_establishment("h1").await.unwrap_err(),
        EngineError::NotFound(_)
    ));
    assert!(matches!(
        engine.get_booking(&booking.id).await.unwrap_err(),
        EngineError::NotFound(_)
    ));
}

#[tokio::test]
async fn booking_history_views() {
    let engine = setup("history.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DLX", "Deluxe", None).await;
    engine.reserve(request(GUEST, "h1", "2025-06-05", 1, "DLX")).await.unwrap();
    engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "DLX")).await.unwrap();
    engine.reserve(request(SECOND_GUEST, "h1", "2025-06-03", 1, "DLX")).await.unwrap();

    let mine = engine.bookings_for_user(GUEST).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].start_date, d("2025-06-01"));

    assert_eq!(engine.bookings_for_partner(PARTNER).await.unwrap().len(), 3);
    assert!(engine.bookings_for_partner(OTHER_PARTNER).await.unwrap().is_empty());
    assert!(matches!(
        engine.bookings_for_partner(GUEST).await.unwrap_err(),
        EngineError::Forbidden(_)
    ));
}

// ── Catalog search ───────────────────────────────────────

fn params(city: &str) -> SearchParams {
    let mut p = SearchParams::new(d("2025-06-01"), 10_000);
    p.city = Some(city.into());
    p
}

#[tokio::test]
async fn search_filters_by_city_type_and_open_state() {
    let engine = setup("search_filters.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DBL", "Double", Some(2)).await;
    hotel(&engine, "h2", "Hà Nội", false).await;
    room(&engine, "h2", "DBL", "Double", Some(2)).await;
    engine
        .create_establishment(new_establishment("r1", "Da Nang", EstablishmentType::Restaurant, false))
        .await
        .unwrap();
    engine
        .add_unit_type(NewUnitType {
            establishment_id: "r1".into(),
            category: UnitCategory::Table,
            code: "T4".into(),
            name: "Table for 4".into(),
            capacity: Some(4),
            has_balcony: None,
            base_price: Some(100),
            total_units: Some(10),
        })
        .await
        .unwrap();

    let offers = engine.search(&params("dn"), &[]).await;
    let ids: Vec<_> = offers.iter().map(|o| o.establishment_id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"h1") && ids.contains(&"r1"));

    let mut hotels = params("dn");
    hotels.establishment_type = Some(EstablishmentType::Hotel);
    let offers = engine.search(&hotels, &[]).await;
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].establishment_id, "h1");

    engine.set_establishment_available("h1", false).await.unwrap();
    assert!(engine.search(&hotels, &[]).await.is_empty());
}

#[tokio::test]
async fn unhelpful_hints_fall_back_to_city_scan() {
    let engine = setup("search_fallback.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "DBL", "Double", Some(2)).await;
    hotel(&engine, "h2", "Hà Nội", false).await;
    room(&engine, "h2", "DBL", "Double", Some(2)).await;

    // The hint names only a Hanoi hotel; the city filter empties it, so the
    // catalog rescans every establishment in Da Nang.
    let offers = engine.search(&params("Đà Nẵng"), &["h2".to_string(), "ghost".to_string()]).await;
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].establishment_id, "h1");

    let hinted = engine.search(&params(""), &["h2".to_string()]).await;
    assert_eq!(hinted.len(), 1);
    assert_eq!(hinted[0].establishment_id, "h2");
}

#[tokio::test]
async fn soft_filters_and_guest_heuristic() {
    let engine = setup("search_soft.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    for (code, name, capacity, balcony, price) in [
        ("SGL", "Single", 1, false, 300),
        ("DBL", "Double Sea View", 2, true, 600),
        ("FAM", "Family Suite", 4, true, 1500),
    ] {
        engine
            .add_unit_type(NewUnitType {
                establishment_id: "h1".into(),
                category: UnitCategory::Room,
                code: code.into(),
                name: name.into(),
                capacity: Some(capacity),
                has_balcony: Some(balcony),
                base_price: Some(price),
                total_units: Some(3),
            })
            .await
            .unwrap();
    }

    let mut p = params("dn");
    p.num_guests = Some(2);
    let offers = engine.search(&p, &[]).await;
    let labels: Vec<_> = offers.iter().map(|o| o.item_type.as_str()).collect();
    assert_eq!(labels, vec!["Double Sea View"]);

    p.max_price = 1000;
    p.num_guests = Some(3);
    // Double is too small and Family is over budget.
    assert!(engine.search(&p, &[]).await.is_empty());

    let mut p = params("dn");
    p.has_balcony = Some(false);
    let offers = engine.search(&p, &[]).await;
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].item_type, "Single");
}

#[tokio::test]
async fn search_ranks_sold_out_last() {
    let engine = setup("search_rank.wal").await;
    hotel(&engine, "h1", "Đà Nẵng", false).await;
    room(&engine, "h1", "A", "Alpha", Some(1)).await;
    room(&engine, "h1", "B", "Bravo", Some(1)).await;
    engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "A")).await.unwrap();

    let offers = engine.search(&params("dn"), &[]).await;
    assert_eq!(offers.len(), 2);
    assert_eq!(offers[0].item_type, "Bravo");
    assert_eq!(offers[1].units_available, 0);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_bookings_and_counters() {
    let path = test_wal_path("replay.wal");
    let booking_id;
    {
        let engine = engine_at(path.clone()).await;
        hotel(&engine, "h1", "Đà Nẵng", true).await;
        ledger(&engine, "h1", "2025-06-01", "Suite", 2, 800).await;
        let kept = engine.reserve(request(GUEST, "h1", "2025-06-01", 1, "Suite")).await.unwrap();
        let cancelled = engine
            .reserve(request(SECOND_GUEST, "h1", "2025-06-01", 1, "Suite"))
            .await
            .unwrap();
        engine
            .update_booking_status(cancelled.id, BookingStatus::Cancelled)
            .await
            .unwrap();
        booking_id = kept.id;
    }

    let engine = Engine::new(path, CityNormalizer::default()).unwrap();
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Suite").await, 1);
    assert_eq!(engine.get_booking(&booking_id).await.unwrap().status, BookingStatus::Confirmed);
    assert_eq!(engine.bookings_for_partner(PARTNER).await.unwrap().len(), 2);
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compaction.wal");
    {
        let engine = engine_at(path.clone()).await;
        hotel(&engine, "h1", "Đà Nẵng", true).await;
        hotel(&engine, "h2", "Huế", false).await;
        let ut = room(&engine, "h2", "DLX", "Deluxe", Some(1)).await;
        engine.set_unit_type_active(ut.id, false).await.unwrap();
        engine.set_establishment_available("h2", false).await.unwrap();
        ledger(&engine, "h1", "2025-06-01", "Suite", 2, 800).await;
        ledger(&engine, "h1", "2025-06-02", "Suite", 2, 800).await;
        let b = engine.reserve(request(GUEST, "h1", "2025-06-01", 2, "Suite")).await.unwrap();
        engine.update_booking_status(b.id, BookingStatus::Cancelled).await.unwrap();
        engine.update_booking_status(b.id, BookingStatus::Confirmed).await.unwrap();
        engine.reserve(request(GUEST, "h1", "2025-06-02", 1, "Suite")).await.unwrap();

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    let engine = Engine::new(path, CityNormalizer::default()).unwrap();
    assert_eq!(units_booked(&engine, "h1", "2025-06-01", "Suite").await, 1);
    assert_eq!(units_booked(&engine, "h1", "2025-06-02", "Suite").await, 2);
    assert!(!engine.get_establishment("h2").await.unwrap().available);
    assert!(!engine.unit_types_of("h2").await.unwrap()[0].active);
    assert_eq!(engine.bookings_for_user(GUEST).await.unwrap().len(), 2);
}
