use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Engine-wide error taxonomy. Every failure raised inside a booking or
/// cancellation transaction rolls the transaction back before one of
/// these is returned; no partial state survives an error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("you already hold an overlapping reservation at another hotel")]
    ConflictingReservation,
    #[error("not enough rooms of type {room_type_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        room_type_id: String,
        requested: i64,
        available: i64,
    },
    #[error("payment declined: {0}")]
    PaymentDeclined(String),
    #[error("payment provider unavailable: {0}")]
    PaymentUnavailable(String),
    #[error("{0}")]
    EntityNotFound(String),
    #[error("the reservation has already been cancelled")]
    AlreadyCancelled,
    #[error("reservations paid with reward points cannot be cancelled online")]
    PointsBookingNotCancellable,
    #[error("refund failed: {0}")]
    RefundFailed(String),
    #[error("cancellation fee charge failed: {0}")]
    FeeChargeFailed(String),
    #[error(transparent)]
    ValidationError(#[from] garde::Report),
    #[error("database query failed")]
    SpecificOperationError(#[source] sqlx::Error),
    #[error("transaction control failed")]
    TransactionError(#[source] sqlx::Error),
    #[error("no rows affected: {0}")]
    NoRowsAffectedError(String),
    #[error("notification delivery failed: {0}")]
    NotificationError(String),
    #[error("{0}")]
    ConversionEntityError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::EntityNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConflictingReservation
            | AppError::InsufficientInventory { .. }
            | AppError::AlreadyCancelled => StatusCode::CONFLICT,
            AppError::PointsBookingNotCancellable => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RefundFailed(_) | AppError::FeeChargeFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::PaymentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SpecificOperationError(_)
            | AppError::TransactionError(_)
            | AppError::NoRowsAffectedError(_)
            | AppError::NotificationError(_)
            | AppError::ConversionEntityError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Kinds that an operator has to look at, beyond normal request logs.
    fn is_alarming(&self) -> bool {
        matches!(
            self,
            AppError::PaymentUnavailable(_)
                | AppError::RefundFailed(_)
                | AppError::FeeChargeFailed(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        if status_code.is_server_error() || self.is_alarming() {
            tracing::error!(
                error.cause_chain = ?self,
                error.message = %self,
                "request failed"
            );
        }
        (
            status_code,
            Json(json!({
                "error": true,
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            AppError::InvalidRequest("bad dates".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ConflictingReservation.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::InsufficientInventory {
                room_type_id: "x".into(),
                requested: 2,
                available: 1,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::PaymentDeclined("card_declined".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::PaymentUnavailable("timeout".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::PointsBookingNotCancellable.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn only_operational_failures_alarm() {
        assert!(AppError::RefundFailed("x".into()).is_alarming());
        assert!(AppError::FeeChargeFailed("x".into()).is_alarming());
        assert!(AppError::PaymentUnavailable("x".into()).is_alarming());
        assert!(!AppError::PaymentDeclined("x".into()).is_alarming());
        assert!(!AppError::AlreadyCancelled.is_alarming());
    }
}
