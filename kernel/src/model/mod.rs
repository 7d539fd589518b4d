pub mod availability;
pub mod hotel;
pub mod id;
pub mod range;
pub mod reservation;
pub mod user;
