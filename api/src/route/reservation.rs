use axum::{
    routing::{get, post},
    Router,
};
use registry::AppRegistry;

use crate::handler::reservation::{
    cancel_reservation, create_reservation, show_guest_reservations, show_reservation,
};

pub fn build_reservation_routers() -> Router<AppRegistry> {
    let reservation_routers = Router::new()
        .route("/", post(create_reservation))
        .route("/:reservation_id", get(show_reservation))
        .route("/:reservation_id/cancel", post(cancel_reservation))
        .route("/guests/:guest_id", get(show_guest_reservations));

    Router::new().nest("/reservations", reservation_routers)
}
