use axum::{routing::get, Router};
use registry::AppRegistry;

use crate::handler::hotel::{hotel_availability, show_hotel};

pub fn build_hotel_routers() -> Router<AppRegistry> {
    let hotel_routers = Router::new()
        .route("/:hotel_id", get(show_hotel))
        .route("/:hotel_id/availability", get(hotel_availability));

    Router::new().nest("/hotels", hotel_routers)
}
