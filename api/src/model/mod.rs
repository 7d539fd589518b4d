pub mod hotel;
pub mod reservation;
