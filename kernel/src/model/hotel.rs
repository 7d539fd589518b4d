use crate::model::id::{HotelId, RoomTypeId};

#[derive(Debug)]
pub struct Hotel {
    pub hotel_id: HotelId,
    pub title: String,
}

/// Reference data for the engine: created and edited by hotel management,
/// never mutated by the booking side.
#[derive(Debug, Clone)]
pub struct RoomType {
    pub room_type_id: RoomTypeId,
    pub hotel_id: HotelId,
    pub name: String,
    /// How many persons one room of this type sleeps.
    pub capacity: i32,
    pub beds: i32,
    pub nightly_rate_cents: i64,
    /// Total physical rooms of this type at the hotel.
    pub total_units: i32,
}
