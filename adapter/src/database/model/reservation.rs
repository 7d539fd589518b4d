use chrono::NaiveDate;
use kernel::model::{
    id::{ClaimId, HotelId, ReservationId, RoomTypeId, UserId},
    range::DateRange,
    reservation::{InventoryClaim, Reservation},
    user::Guest,
};
use shared::error::{AppError, AppResult};

#[derive(sqlx::FromRow)]
pub struct ReservationRow {
    pub reservation_id: ReservationId,
    pub hotel_id: HotelId,
    pub user_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub total_cost_cents: i64,
    pub charge_id: Option<String>,
    pub paid_with_points: bool,
}

impl ReservationRow {
    /// Assemble the aggregate from the row plus its ledger claims. The
    /// dates and status columns are constrained in the schema, so a
    /// conversion failure here means the row was tampered with.
    pub fn into_reservation(self, claims: Vec<InventoryClaim>) -> AppResult<Reservation> {
        let term = DateRange::new(self.start_date, self.end_date).ok_or_else(|| {
            AppError::ConversionEntityError(format!(
                "reservation {} has an empty date range",
                self.reservation_id
            ))
        })?;
        let status = self
            .status
            .parse()
            .map_err(AppError::ConversionEntityError)?;
        Ok(Reservation {
            reservation_id: self.reservation_id,
            hotel_id: self.hotel_id,
            guest_id: self.user_id,
            term,
            status,
            total_cost_cents: self.total_cost_cents,
            charge_id: self.charge_id,
            paid_with_points: self.paid_with_points,
            claims,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct ClaimRow {
    pub claim_id: ClaimId,
    pub hotel_id: HotelId,
    pub room_type_id: RoomTypeId,
    pub reservation_id: ReservationId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
}

impl TryFrom<ClaimRow> for InventoryClaim {
    type Error = AppError;

    fn try_from(value: ClaimRow) -> Result<Self, Self::Error> {
        let term = DateRange::new(value.start_date, value.end_date).ok_or_else(|| {
            AppError::ConversionEntityError(format!(
                "claim {} has an empty date range",
                value.claim_id
            ))
        })?;
        let status = value
            .status
            .parse()
            .map_err(AppError::ConversionEntityError)?;
        Ok(InventoryClaim {
            claim_id: value.claim_id,
            hotel_id: value.hotel_id,
            room_type_id: value.room_type_id,
            reservation_id: value.reservation_id,
            term,
            status,
        })
    }
}

/// Overlapping-claim tally per room type, the subtrahend of the
/// availability computation.
#[derive(sqlx::FromRow)]
pub struct ClaimCountRow {
    pub room_type_id: RoomTypeId,
    pub claimed: i64,
}

#[derive(sqlx::FromRow)]
pub struct GuestRow {
    pub user_id: UserId,
    pub email: String,
    pub points: i64,
    pub payment_customer_ref: Option<String>,
}

impl From<GuestRow> for Guest {
    fn from(value: GuestRow) -> Self {
        let GuestRow {
            user_id,
            email,
            points,
            payment_customer_ref,
        } = value;
        Guest {
            user_id,
            email,
            points,
            payment_customer_ref,
        }
    }
}
