use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use std::fmt::Display;

/// Infrastructure faults. Nothing here is a policy decision; every variant is
/// reported to callers as a retryable `BookingError::Transient`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database session error: {0}")]
    DatabaseSession(#[from] scylla::errors::NewSessionError),

    #[error("Database execution error: {0}")]
    DatabaseExecution(#[from] scylla::errors::ExecutionError),

    #[error("Database result error: {0}")]
    DatabaseIntoRows(#[from] scylla::errors::IntoRowsResultError),

    #[error("Database row error: {0}")]
    DatabaseRows(#[from] scylla::errors::RowsError),

    #[error("Database first row error: {0}")]
    DatabaseFirstRow(#[from] scylla::errors::FirstRowError),

    #[error("Database maybe first row error: {0}")]
    DatabaseMaybeFirstRow(#[from] scylla::errors::MaybeFirstRowError),

    #[error("Database Deserialization error: {0}")]
    DatabaseDeserialization(#[from] scylla::errors::DeserializationError),

    #[error("Database prepare error: {0}")]
    DatabasePrepare(#[from] scylla::errors::PrepareError),

    #[error("Lightweight transaction kept losing on {0}")]
    Contention(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Machine-readable name of a refusal, sent to clients as `error_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    SlotUnavailable,
    SlotInPast,
    SlotFull,
    SlotNotFound,
    TooFarAhead,
    DuplicateDayBooking,
    CancellationTooLate,
    AlreadyPast,
    ManagerOwned,
    NotFound,
    MemberNotFound,
    MembershipInactive,
    EmailTaken,
    InvalidCapacity,
    InvalidTimeFormat,
    InvalidWeekday,
    InvalidDate,
    InvalidMember,
    Transient,
}

/// Outcome of a refused booking, cancellation or manager operation.
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("{0} is not on the timetable")]
    SlotNotFound(String),

    #[error("{0} is not available")]
    SlotUnavailable(String),

    #[error("{0} has already started")]
    SlotInPast(String),

    #[error("{0} is full")]
    SlotFull(String),

    #[error("Classes can be booked at most {0} day(s) ahead")]
    TooFarAhead(i64),

    #[error("Member already has a class booked on {0}")]
    DuplicateDayBooking(NaiveDate),

    #[error("Reservations cannot be cancelled less than {0} minutes before class")]
    CancellationTooLate(i64),

    #[error("Class has already started")]
    AlreadyPast,

    #[error("Attendance added by a manager can only be removed by a manager")]
    ManagerOwned,

    #[error("Reservation not found")]
    NotFound,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Membership is not active")]
    MembershipInactive,

    #[error("Email {0} is already registered")]
    EmailTaken(String),

    #[error("Invalid capacity {0}")]
    InvalidCapacity(i64),

    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("Invalid weekday: {0}")]
    InvalidWeekday(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid member details: {0}")]
    InvalidMember(String),

    #[error("Temporary failure, please retry")]
    Transient(#[source] AppError),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::SlotNotFound(_) => ErrorKind::SlotNotFound,
            BookingError::SlotUnavailable(_) => ErrorKind::SlotUnavailable,
            BookingError::SlotInPast(_) => ErrorKind::SlotInPast,
            BookingError::SlotFull(_) => ErrorKind::SlotFull,
            BookingError::TooFarAhead(_) => ErrorKind::TooFarAhead,
            BookingError::DuplicateDayBooking(_) => ErrorKind::DuplicateDayBooking,
            BookingError::CancellationTooLate(_) => ErrorKind::CancellationTooLate,
            BookingError::AlreadyPast => ErrorKind::AlreadyPast,
            BookingError::ManagerOwned => ErrorKind::ManagerOwned,
            BookingError::NotFound => ErrorKind::NotFound,
            BookingError::MemberNotFound => ErrorKind::MemberNotFound,
            BookingError::MembershipInactive => ErrorKind::MembershipInactive,
            BookingError::EmailTaken(_) => ErrorKind::EmailTaken,
            BookingError::InvalidCapacity(_) => ErrorKind::InvalidCapacity,
            BookingError::InvalidTimeFormat(_) => ErrorKind::InvalidTimeFormat,
            BookingError::InvalidWeekday(_) => ErrorKind::InvalidWeekday,
            BookingError::InvalidDate(_) => ErrorKind::InvalidDate,
            BookingError::InvalidMember(_) => ErrorKind::InvalidMember,
            BookingError::Transient(_) => ErrorKind::Transient,
        }
    }
}

impl From<AppError> for BookingError {
    #[track_caller]
    fn from(err: AppError) -> Self {
        let location = std::panic::Location::caller();
        error!(
            "{}:{}: persistence fault surfaced as transient: {}",
            location.file(),
            location.line(),
            err
        );
        BookingError::Transient(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error_kind: ErrorKind,
    error_message: String,
}

impl ResponseError for BookingError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidCapacity
            | ErrorKind::InvalidTimeFormat
            | ErrorKind::InvalidWeekday
            | ErrorKind::InvalidDate
            | ErrorKind::InvalidMember => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound | ErrorKind::SlotNotFound | ErrorKind::MemberNotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorKind::SlotFull | ErrorKind::DuplicateDayBooking | ErrorKind::EmailTaken => {
                StatusCode::CONFLICT
            }
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            success: false,
            error_kind: self.kind(),
            error_message: self.to_string(),
        })
    }
}


pub trait TraceErr<T, E> {
    #[track_caller]
    fn trace_err(self, context: &'static str) -> std::result::Result<T, E>;
    fn trace(self) -> std::result::Result<T, E>;
}

impl<T, E: Display> TraceErr<T, E> for std::result::Result<T, E> {
    #[track_caller]
    fn trace_err(self, context: &'static str) -> std::result::Result<T, E> {
        if let Err(ref e) = self {
            let location = std::panic::Location::caller();
            error!(
                "{}:{}: error in {}: {}",
                location.file(),
                location.line(),
                context,
                e
            );
        }
        self
    }

    #[track_caller]
    fn trace(self) -> std::result::Result<T, E> {
        if let Err(ref e) = self {
            let location = std::panic::Location::caller();
            error!(
                "{}:{}: error: {}",
                location.file(),
                location.line(),
                e
            );
        }
        self
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals_map_to_http_statuses() {
        assert_eq!(BookingError::SlotFull("Monday 6:00 AM".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(BookingError::TooFarAhead(1).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(BookingError::InvalidCapacity(0).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(BookingError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            BookingError::from(AppError::Contention("slot_occupancy".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn transient_message_hides_the_cause() {
        let err = BookingError::from(AppError::Internal("connection reset".into()));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(!err.to_string().contains("connection reset"));
    }

    #[test]
    fn error_kind_serializes_as_its_name() {
        let json = serde_json::to_string(&ErrorKind::DuplicateDayBooking).unwrap();
        assert_eq!(json, "\"DuplicateDayBooking\"");
    }
}
