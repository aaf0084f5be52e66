use std::io;
use std::net::SocketAddr;

use crate::sql::{BookingFilter, Command};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "lodgr_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "lodgr_query_duration_seconds";

/// Counter: reservation attempts. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "lodgr_reservations_total";

/// Counter: confirmed nights that had no ledger row to count against.
pub const LEDGER_INCONSISTENCIES_TOTAL: &str = "lodgr_ledger_inconsistencies_total";

/// Counter: collaborator calls answered by the local fallback. Labels: call.
pub const COLLABORATOR_FALLBACKS_TOTAL: &str = "lodgr_collaborator_fallbacks_total";

/// Histogram: collaborator round-trip in seconds. Labels: call.
pub const COLLABORATOR_DURATION_SECONDS: &str = "lodgr_collaborator_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "lodgr_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "lodgr_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "lodgr_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "lodgr_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "lodgr_wal_flush_batch_size";

/// Histogram: seconds spent rewriting the WAL during compaction.
pub const WAL_COMPACTION_DURATION_SECONDS: &str = "lodgr_wal_compaction_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> io::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| io::Error::other(format!("failed to install Prometheus exporter: {e}")))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertUser { .. } => "insert_user",
        Command::InsertEstablishment(_) => "insert_establishment",
        Command::SetEstablishmentAvailable { .. } => "set_establishment_available",
        Command::DeleteEstablishment { .. } => "delete_establishment",
        Command::InsertUnitType(_) => "insert_unit_type",
        Command::SetUnitTypeActive { .. } => "set_unit_type_active",
        Command::UpsertInventory(_) => "upsert_inventory",
        Command::InsertBooking(_) => "insert_booking",
        Command::SetBookingStatus { .. } => "set_booking_status",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectSearch { .. } => "select_search",
        Command::SelectBookings(BookingFilter::Id(_)) => "select_booking",
        Command::SelectBookings(BookingFilter::User(_)) => "select_user_bookings",
        Command::SelectBookings(BookingFilter::Partner(_)) => "select_partner_bookings",
        Command::SelectEstablishments { .. } => "select_establishments",
        Command::SelectUnitTypes { .. } => "select_unit_types",
        Command::SelectInventory { .. } => "select_inventory",
    }
}
