use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::Role;

/// Input problems caught before any query is issued.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("juz must be between 1 and 30, got {0}")]
    JuzOutOfRange(i32),

    #[error("ayat numbers start at 1, got {0}")]
    AyatNotPositive(i32),

    #[error("ayat range is reversed: {start} > {end}")]
    AyatRangeReversed { start: i32, end: i32 },

    #[error("poin cannot be negative, got {0}")]
    NegativePoin(i32),

    #[error("a setoran can only be reviewed as diterima or ditolak, got {0}")]
    InvalidVerdict(String),

    #[error("status {0} cannot be recorded")]
    UnknownStatus(String),

    #[error("start date {start} is after end date {end}")]
    DateRangeReversed { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("--user is required for this command")]
    MissingUser,

    #[error("no user with id {0}")]
    UnknownUser(Uuid),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("{action} is not available to role {role}")]
    Forbidden { action: &'static str, role: Role },

    #[error("you have not joined a class yet")]
    NoOrganize,
}

/// Rejection of a request before it reaches the backend, or its
/// cancellation while in flight.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("interrupted before the request finished")]
    Interrupted,
}

/// Writes the backend refused because of the state of the records.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("setoran {0} not found in your class")]
    SetoranNotFound(Uuid),

    #[error("setoran {id} was already reviewed ({status})")]
    AlreadyReviewed { id: Uuid, status: String },

    #[error("student {0} is not in your class")]
    NotInClass(Uuid),
}
