use async_trait::async_trait;
use shared::error::AppResult;

use crate::model::hotel::{Hotel, RoomType};
use crate::model::id::HotelId;

/// Read-only access to the hotel/room-type catalog. The engine never
/// writes this data; hotel management owns it.
#[async_trait]
pub trait HotelRepository: Send + Sync {
    async fn find_by_id(&self, hotel_id: HotelId) -> AppResult<Option<Hotel>>;
    async fn find_room_types(&self, hotel_id: HotelId) -> AppResult<Vec<RoomType>>;
}
