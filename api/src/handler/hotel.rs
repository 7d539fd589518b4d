use axum::{
    extract::{Path, Query, State},
    Json,
};
use kernel::model::id::HotelId;
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

use crate::model::hotel::{AvailabilityQuery, AvailabilityResponse, HotelResponse};

pub async fn show_hotel(
    Path(hotel_id): Path<HotelId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<HotelResponse>> {
    let repo = registry.hotel_repository();
    let hotel = repo
        .find_by_id(hotel_id)
        .await?
        .ok_or_else(|| AppError::EntityNotFound(format!("hotel {hotel_id} not found")))?;
    let room_types = repo.find_room_types(hotel_id).await?;
    Ok(Json(HotelResponse::new(hotel, room_types)))
}

/// Remaining units per room type for a stay. Outside a booking
/// transaction this is a snapshot for search and display; the booking
/// path recomputes it under its own transaction.
pub async fn hotel_availability(
    Path(hotel_id): Path<HotelId>,
    Query(query): Query<AvailabilityQuery>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<AvailabilityResponse>> {
    let term = query.into_range()?;
    registry
        .reservation_repository()
        .availability(hotel_id, term)
        .await
        .map(AvailabilityResponse::from)
        .map(Json)
}
