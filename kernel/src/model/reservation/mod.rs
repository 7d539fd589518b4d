use crate::model::id::{ClaimId, HotelId, ReservationId, RoomTypeId, UserId};
use crate::model::range::DateRange;

pub mod event;

/// Reservation lifecycle. `Pending` is the confirmed, inventory-holding
/// state: a reservation blocks inventory from the moment its transaction
/// commits. `Cancelled` is the only other reachable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Pending,
    Cancelled,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "cancelled" => Ok(ClaimStatus::Cancelled),
            other => Err(format!("unknown claim status: {other}")),
        }
    }
}

/// One physical room held for one date range. The ledger row is never
/// deleted; cancellation flips the status and availability stops
/// counting it.
#[derive(Debug, Clone)]
pub struct InventoryClaim {
    pub claim_id: ClaimId,
    pub hotel_id: HotelId,
    pub room_type_id: RoomTypeId,
    pub reservation_id: ReservationId,
    pub term: DateRange,
    pub status: ClaimStatus,
}

/// Aggregate root over its inventory claims: one claim per physical room
/// requested (three double rooms make three claims), all created in the
/// same transaction as the reservation itself.
#[derive(Debug)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub hotel_id: HotelId,
    pub guest_id: UserId,
    pub term: DateRange,
    pub status: ReservationStatus,
    pub total_cost_cents: i64,
    /// Provider charge id when paid by card; `None` for point redemptions.
    pub charge_id: Option<String>,
    pub paid_with_points: bool,
    pub claims: Vec<InventoryClaim>,
}

/// How the guest settles the booking.
#[derive(Debug, Clone)]
pub enum PaymentMethod {
    /// Redeem loyalty points: the balance must cover twice the total cost
    /// in points and is debited in the booking transaction.
    Points,
    /// Charge a card through the payment provider using a one-time
    /// source token.
    Card { source_token: String },
}

/// Outcome of a successful cancellation: what was refunded and what the
/// fee charge came to.
#[derive(Debug)]
pub struct CancellationReceipt {
    pub reservation_id: ReservationId,
    pub refunded_charge_id: String,
    pub fee_charge_id: String,
    pub fee_cents: i64,
}
