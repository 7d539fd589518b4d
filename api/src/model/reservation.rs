use chrono::{Local, NaiveDate};
use garde::Validate;
use kernel::model::id::{ClaimId, HotelId, ReservationId, RoomTypeId, UserId};
use kernel::model::range::DateRange;
use kernel::model::reservation::{
    event::{CreateBooking, RequestedUnit},
    CancellationReceipt, InventoryClaim, PaymentMethod, Reservation,
};
use serde::{Deserialize, Serialize};
use shared::error::AppError;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    #[garde(skip)]
    pub guest_id: UserId,
    #[garde(skip)]
    pub hotel_id: HotelId,
    #[garde(skip)]
    pub start_date: NaiveDate,
    #[garde(skip)]
    pub end_date: NaiveDate,
    #[garde(length(min = 1), dive)]
    pub rooms: Vec<RequestedRoom>,
    #[garde(skip)]
    pub payment: PaymentMethodRequest,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestedRoom {
    #[garde(skip)]
    pub room_type_id: RoomTypeId,
    #[garde(range(min = 1))]
    pub count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PaymentMethodRequest {
    /// Redeem loyalty points instead of charging a card.
    Points,
    /// Charge the guest's card via a one-time source token.
    Card { token: String },
}

impl From<PaymentMethodRequest> for PaymentMethod {
    fn from(value: PaymentMethodRequest) -> Self {
        match value {
            PaymentMethodRequest::Points => PaymentMethod::Points,
            PaymentMethodRequest::Card { token } => PaymentMethod::Card {
                source_token: token,
            },
        }
    }
}

impl TryFrom<CreateReservationRequest> for CreateBooking {
    type Error = AppError;

    fn try_from(value: CreateReservationRequest) -> Result<Self, Self::Error> {
        if value.start_date < Local::now().date_naive() {
            return Err(AppError::InvalidRequest(
                "invalid date range: make sure your reservation isn't in the past".into(),
            ));
        }
        let term = DateRange::new(value.start_date, value.end_date).ok_or_else(|| {
            AppError::InvalidRequest("the checkout date must be after the check-in date".into())
        })?;
        let units = value
            .rooms
            .into_iter()
            .map(|room| RequestedUnit::new(room.room_type_id, room.count))
            .collect();
        Ok(CreateBooking::new(
            value.guest_id,
            value.hotel_id,
            term,
            units,
            value.payment.into(),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReservationRequest {
    pub guest_id: UserId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationsResponse {
    pub items: Vec<ReservationResponse>,
}

impl From<Vec<Reservation>> for ReservationsResponse {
    fn from(value: Vec<Reservation>) -> Self {
        Self {
            items: value.into_iter().map(ReservationResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub reservation_id: ReservationId,
    pub hotel_id: HotelId,
    pub guest_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub total_cost_cents: i64,
    pub paid_with_points: bool,
    pub rooms: Vec<ClaimResponse>,
}

impl From<Reservation> for ReservationResponse {
    fn from(value: Reservation) -> Self {
        let Reservation {
            reservation_id,
            hotel_id,
            guest_id,
            term,
            status,
            total_cost_cents,
            charge_id: _,
            paid_with_points,
            claims,
        } = value;
        Self {
            reservation_id,
            hotel_id,
            guest_id,
            start_date: term.start(),
            end_date: term.end(),
            status: status.as_str().into(),
            total_cost_cents,
            paid_with_points,
            rooms: claims.into_iter().map(ClaimResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub claim_id: ClaimId,
    pub room_type_id: RoomTypeId,
    pub status: String,
}

impl From<InventoryClaim> for ClaimResponse {
    fn from(value: InventoryClaim) -> Self {
        Self {
            claim_id: value.claim_id,
            room_type_id: value.room_type_id,
            status: value.status.as_str().into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationResponse {
    pub reservation_id: ReservationId,
    pub refunded_charge_id: String,
    pub fee_cents: i64,
}

impl From<CancellationReceipt> for CancellationResponse {
    fn from(value: CancellationReceipt) -> Self {
        Self {
            reservation_id: value.reservation_id,
            refunded_charge_id: value.refunded_charge_id,
            fee_cents: value.fee_cents,
        }
    }
}
