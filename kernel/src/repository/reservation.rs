use async_trait::async_trait;
use shared::error::AppResult;

use crate::model::availability::RoomTypeAvailability;
use crate::model::id::{HotelId, ReservationId, UserId};
use crate::model::range::DateRange;
use crate::model::reservation::{
    event::{CancelBooking, CreateBooking},
    CancellationReceipt, Reservation,
};

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Remaining units per room type of the hotel over the range. Called
    /// outside a booking transaction this is a best-effort snapshot; the
    /// booking path re-runs the same computation under its own
    /// transaction before claiming anything.
    async fn availability(
        &self,
        hotel_id: HotelId,
        term: DateRange,
    ) -> AppResult<Vec<RoomTypeAvailability>>;

    /// Atomically validate, claim inventory, and settle payment. Either a
    /// fully charged reservation with all its claims exists afterwards,
    /// or nothing does.
    async fn book(&self, event: CreateBooking) -> AppResult<Reservation>;

    /// Cancel a reservation: release its claims, refund the original
    /// charge, then collect the cancellation fee. Refund and fee are
    /// both-or-neither; any failure leaves the reservation active.
    async fn cancel(&self, event: CancelBooking) -> AppResult<CancellationReceipt>;

    async fn find_by_id(&self, reservation_id: ReservationId) -> AppResult<Reservation>;

    /// Non-cancelled reservations held by a guest, newest first.
    async fn find_active_by_guest(&self, guest_id: UserId) -> AppResult<Vec<Reservation>>;
}
