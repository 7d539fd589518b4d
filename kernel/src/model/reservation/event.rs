use derive_new::new;

use crate::model::id::{HotelId, ReservationId, RoomTypeId, UserId};
use crate::model::range::DateRange;
use crate::model::reservation::PaymentMethod;

/// One line of a booking request: `count` rooms of one type.
#[derive(Debug, Clone, new)]
pub struct RequestedUnit {
    pub room_type_id: RoomTypeId,
    pub count: u32,
}

#[derive(Debug, new)]
pub struct CreateBooking {
    pub guest_id: UserId,
    pub hotel_id: HotelId,
    pub term: DateRange,
    pub units: Vec<RequestedUnit>,
    pub payment: PaymentMethod,
}

#[derive(Debug, new)]
pub struct CancelBooking {
    pub reservation_id: ReservationId,
    /// Guest performing the cancellation; must own the reservation.
    pub actor_guest_id: UserId,
}
