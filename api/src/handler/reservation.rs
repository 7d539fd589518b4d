use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use garde::Validate;
use kernel::gateway::notification::NotificationGateway;
use kernel::model::id::{ReservationId, UserId};
use registry::AppRegistry;
use shared::error::AppResult;
use std::sync::Arc;

use crate::model::reservation::{
    CancelReservationRequest, CancellationResponse, CreateReservationRequest, ReservationResponse,
    ReservationsResponse,
};

pub async fn create_reservation(
    State(registry): State<AppRegistry>,
    Json(req): Json<CreateReservationRequest>,
) -> AppResult<(StatusCode, Json<ReservationResponse>)> {
    req.validate(&())?;

    let reservation = registry
        .reservation_repository()
        .book(req.try_into()?)
        .await?;

    // Confirmation mail goes out after the transaction committed and must
    // never affect the booking outcome.
    notify_detached(
        registry.notification_gateway(),
        reservation.guest_id,
        "reservation_confirmed",
        serde_json::json!({
            "reservationId": reservation.reservation_id,
            "hotelId": reservation.hotel_id,
            "startDate": reservation.term.start(),
            "endDate": reservation.term.end(),
            "totalCostCents": reservation.total_cost_cents,
        }),
    );

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

pub async fn cancel_reservation(
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<CancelReservationRequest>,
) -> AppResult<Json<CancellationResponse>> {
    let receipt = registry
        .reservation_repository()
        .cancel(kernel::model::reservation::event::CancelBooking::new(
            reservation_id,
            req.guest_id,
        ))
        .await?;

    notify_detached(
        registry.notification_gateway(),
        req.guest_id,
        "reservation_cancelled",
        serde_json::json!({
            "reservationId": receipt.reservation_id,
            "refundedChargeId": receipt.refunded_charge_id,
            "feeCents": receipt.fee_cents,
        }),
    );

    Ok(Json(receipt.into()))
}

pub async fn show_reservation(
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<ReservationResponse>> {
    registry
        .reservation_repository()
        .find_by_id(reservation_id)
        .await
        .map(ReservationResponse::from)
        .map(Json)
}

pub async fn show_guest_reservations(
    Path(guest_id): Path<UserId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<ReservationsResponse>> {
    registry
        .reservation_repository()
        .find_active_by_guest(guest_id)
        .await
        .map(ReservationsResponse::from)
        .map(Json)
}

fn notify_detached(
    gateway: Arc<dyn NotificationGateway>,
    user_id: UserId,
    template: &'static str,
    data: serde_json::Value,
) {
    tokio::spawn(async move {
        if let Err(e) = gateway.send(user_id, template, data).await {
            tracing::warn!(
                %user_id,
                template,
                error.message = %e,
                "notification delivery failed"
            );
        }
    });
}
