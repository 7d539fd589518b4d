use axum::Router;
use registry::AppRegistry;

use super::{
    health::build_health_check_routers, hotel::build_hotel_routers,
    reservation::build_reservation_routers,
};

pub fn routes() -> Router<AppRegistry> {
    let router = Router::new()
        .merge(build_health_check_routers())
        .merge(build_hotel_routers())
        .merge(build_reservation_routers());
    Router::new().nest("/api/v1", router)
}
