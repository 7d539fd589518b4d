pub mod health;
pub mod hotel;
pub mod reservation;
