use async_trait::async_trait;
use derive_new::new;
use kernel::model::hotel::{Hotel, RoomType};
use kernel::model::id::HotelId;
use kernel::repository::hotel::HotelRepository;
use shared::error::{AppError, AppResult};

use crate::database::model::hotel::{HotelRow, RoomTypeRow};
use crate::database::ConnectionPool;

#[derive(new)]
pub struct HotelRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl HotelRepository for HotelRepositoryImpl {
    async fn find_by_id(&self, hotel_id: HotelId) -> AppResult<Option<Hotel>> {
        let row: Option<HotelRow> = sqlx::query_as(
            r#"
                SELECT hotel_id, title
                FROM hotels
                WHERE hotel_id = $1
            "#,
        )
        .bind(hotel_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(row.map(Hotel::from))
    }

    async fn find_room_types(&self, hotel_id: HotelId) -> AppResult<Vec<RoomType>> {
        let rows: Vec<RoomTypeRow> = sqlx::query_as(
            r#"
                SELECT
                    room_type_id,
                    hotel_id,
                    name,
                    capacity,
                    beds,
                    nightly_rate_cents,
                    total_units
                FROM room_types
                WHERE hotel_id = $1
                ORDER BY nightly_rate_cents ASC
            "#,
        )
        .bind(hotel_id)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(rows.into_iter().map(RoomType::from).collect())
    }
}
