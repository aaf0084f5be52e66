use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    UnknownItemType(String),
    NotFound(String),
    Forbidden(String),
    CapacityExceeded {
        item_type: String,
        capacity: u32,
        night: Option<NaiveDate>,
    },
    InvalidTransition {
        id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    },
    HasActiveBookings(String),
    AlreadyExists(String),
    EstablishmentClosed(String),
    WalError(String),
}

impl EngineError {
    /// SQLSTATE reported to wire clients.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::Validation(_) | EngineError::UnknownItemType(_) => "22023",
            EngineError::NotFound(_) => "P0002",
            EngineError::Forbidden(_) => "42501",
            EngineError::CapacityExceeded { .. } => "23P01",
            EngineError::InvalidTransition { .. } | EngineError::EstablishmentClosed(_) => "55000",
            EngineError::HasActiveBookings(_) => "23503",
            EngineError::AlreadyExists(_) => "23505",
            EngineError::WalError(_) => "58030",
        }
    }

    /// Short label for the reservations outcome counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            EngineError::CapacityExceeded { .. } => "sold_out",
            EngineError::Validation(_) | EngineError::UnknownItemType(_) => "invalid",
            EngineError::NotFound(_) | EngineError::Forbidden(_) => "rejected",
            EngineError::EstablishmentClosed(_) => "closed",
            _ => "error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::UnknownItemType(item) => write!(f, "unknown item type: '{item}'"),
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::CapacityExceeded { item_type, capacity, night } => match night {
                Some(night) => write!(f, "'{item_type}' is sold out for the night of {night}"),
                None => write!(f, "'{item_type}' is sold out: all {capacity} units taken"),
            },
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "booking {id} cannot move from {from} to {to}")
            }
            EngineError::HasActiveBookings(id) => {
                write!(f, "cannot delete establishment {id}: it has active bookings")
            }
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::EstablishmentClosed(id) => {
                write!(f, "establishment {id} is not accepting reservations")
            }
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
