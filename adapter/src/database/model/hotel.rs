use kernel::model::{
    hotel::{Hotel, RoomType},
    id::{HotelId, RoomTypeId},
};

#[derive(sqlx::FromRow)]
pub struct HotelRow {
    pub hotel_id: HotelId,
    pub title: String,
}

impl From<HotelRow> for Hotel {
    fn from(value: HotelRow) -> Self {
        let HotelRow { hotel_id, title } = value;
        Hotel { hotel_id, title }
    }
}

#[derive(sqlx::FromRow)]
pub struct RoomTypeRow {
    pub room_type_id: RoomTypeId,
    pub hotel_id: HotelId,
    pub name: String,
    pub capacity: i32,
    pub beds: i32,
    pub nightly_rate_cents: i64,
    pub total_units: i32,
}

impl From<RoomTypeRow> for RoomType {
    fn from(value: RoomTypeRow) -> Self {
        let RoomTypeRow {
            room_type_id,
            hotel_id,
            name,
            capacity,
            beds,
            nightly_rate_cents,
            total_units,
        } = value;
        RoomType {
            room_type_id,
            hotel_id,
            name,
            capacity,
            beds,
            nightly_rate_cents,
            total_units,
        }
    }
}
