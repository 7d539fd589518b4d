use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use derive_new::new;
use uuid::Uuid;

use kernel::gateway::payment::{PaymentError, PaymentGateway};
use kernel::model::availability::{quote_total_cents, subtract_claims, RoomTypeAvailability};
use kernel::model::hotel::RoomType;
use kernel::model::id::{ClaimId, HotelId, ReservationId, RoomTypeId, UserId};
use kernel::model::range::DateRange;
use kernel::model::reservation::{
    event::{CancelBooking, CreateBooking},
    CancellationReceipt, ClaimStatus, InventoryClaim, PaymentMethod, Reservation,
    ReservationStatus,
};
use kernel::model::user::Guest;
use kernel::repository::reservation::ReservationRepository;
use shared::error::{AppError, AppResult};

use crate::database::model::reservation::{ClaimCountRow, ClaimRow, GuestRow, ReservationRow};
use crate::database::ConnectionPool;

/// Points debited per cent of booking cost on redemption.
const POINTS_PER_CENT: i64 = 2;

#[derive(new)]
pub struct ReservationRepositoryImpl {
    db: ConnectionPool,
    payment: Arc<dyn PaymentGateway>,
    currency: String,
    cancellation_fee_cents: i64,
}

#[async_trait]
impl ReservationRepository for ReservationRepositoryImpl {
    async fn availability(
        &self,
        hotel_id: HotelId,
        term: DateRange,
    ) -> AppResult<Vec<RoomTypeAvailability>> {
        let hotel: Option<(Uuid,)> = sqlx::query_as("SELECT hotel_id FROM hotels WHERE hotel_id = $1")
            .bind(hotel_id)
            .fetch_optional(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;
        if hotel.is_none() {
            return Err(AppError::EntityNotFound(format!("hotel {hotel_id} not found")));
        }

        let room_types: Vec<RoomType> = sqlx::query_as::<_, crate::database::model::hotel::RoomTypeRow>(
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
        .map_err(AppError::SpecificOperationError)?
        .into_iter()
        .map(RoomType::from)
        .collect();

        let type_ids: Vec<Uuid> = room_types.iter().map(|rt| rt.room_type_id.raw()).collect();
        let claimed =
            count_overlapping_claims(self.db.inner_ref(), hotel_id, &type_ids, term).await?;

        Ok(subtract_claims(&room_types, &claimed))
    }

    // The booking state machine. Everything between begin() and commit()
    // is one transaction: the conflict-guard read, the availability
    // recheck, the reservation/claim inserts and the payment settlement
    // all roll back together on any failure.
    async fn book(&self, event: CreateBooking) -> AppResult<Reservation> {
        let units = aggregate_units(&event.units)?;

        let mut tx = self.db.begin().await?;

        // Locks the guest row, which also serializes point redemptions
        // for this guest.
        let guest = lock_guest(&mut tx, event.guest_id).await?;

        if has_conflict(&mut tx, event.guest_id, event.hotel_id, event.term).await? {
            return Err(AppError::ConflictingReservation);
        }

        // Row locks on the requested room types are the concurrency
        // scheme: every booking that touches a room type queues on its
        // row before recounting claims, so two concurrent bookers can
        // never both pass the availability recheck.
        let room_types = lock_room_types(&mut tx, event.hotel_id, &units).await?;

        let type_ids: Vec<Uuid> = room_types.iter().map(|rt| rt.room_type_id.raw()).collect();
        let claimed =
            count_overlapping_claims(&mut *tx, event.hotel_id, &type_ids, event.term).await?;
        let availability = subtract_claims(&room_types, &claimed);

        for (room_type_id, count) in &units {
            let remaining = availability
                .iter()
                .find(|a| a.room_type_id == *room_type_id)
                .map(|a| a.units_available)
                .unwrap_or(0);
            if remaining < i64::from(*count) {
                return Err(AppError::InsufficientInventory {
                    room_type_id: room_type_id.to_string(),
                    requested: i64::from(*count),
                    available: remaining,
                });
            }
        }

        let rate_of: HashMap<RoomTypeId, i64> = room_types
            .iter()
            .map(|rt| (rt.room_type_id, rt.nightly_rate_cents))
            .collect();
        let total_cost_cents = quote_total_cents(
            event.term.nights(),
            units.iter().map(|(id, count)| (rate_of[id], *count)),
        );

        let reservation_id = ReservationId::new();
        insert_reservation(
            &mut tx,
            reservation_id,
            &event,
            total_cost_cents,
            matches!(event.payment, PaymentMethod::Points),
        )
        .await?;
        let claims = insert_claims(&mut tx, reservation_id, &event, &units).await?;

        let (charge_id, guard) = match &event.payment {
            PaymentMethod::Points => {
                redeem_points(&mut tx, event.guest_id, total_cost_cents).await?;
                (None, RefundOnDrop::unarmed())
            }
            PaymentMethod::Card { source_token } => {
                let customer_ref = guest.payment_customer_ref.as_deref().ok_or_else(|| {
                    AppError::InvalidRequest("guest has no payment account on file".into())
                })?;
                let charge_id = self
                    .payment
                    .charge(
                        total_cost_cents,
                        &self.currency,
                        customer_ref,
                        Some(source_token),
                    )
                    .await
                    .map_err(charge_error)?;
                // From the moment the charge succeeds nothing is durable
                // yet. The guard is armed before any further await: a
                // failed charge-id write, a failed commit, or this future
                // being dropped (client disconnect) all refund the charge
                // best-effort.
                let guard = RefundOnDrop::armed(Arc::clone(&self.payment), charge_id.clone());
                set_charge_id(&mut tx, reservation_id, &charge_id).await?;
                (Some(charge_id), guard)
            }
        };

        tx.commit().await.map_err(AppError::TransactionError)?;
        guard.defuse();

        Ok(Reservation {
            reservation_id,
            hotel_id: event.hotel_id,
            guest_id: event.guest_id,
            term: event.term,
            status: ReservationStatus::Pending,
            total_cost_cents,
            charge_id,
            paid_with_points: matches!(event.payment, PaymentMethod::Points),
            claims,
        })
    }

    // Cancellation is refund-then-fee, both-or-neither: any failure rolls
    // the whole transaction back and the reservation keeps holding its
    // inventory.
    async fn cancel(&self, event: CancelBooking) -> AppResult<CancellationReceipt> {
        let mut tx = self.db.begin().await?;

        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
                SELECT
                    reservation_id,
                    hotel_id,
                    user_id,
                    start_date,
                    end_date,
                    status,
                    total_cost_cents,
                    charge_id,
                    paid_with_points
                FROM reservations
                WHERE reservation_id = $1
                FOR UPDATE
            "#,
        )
        .bind(event.reservation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        // A reservation owned by someone else reads as absent rather than
        // forbidden, so ids cannot be probed.
        let row = match row {
            Some(row) if row.user_id == event.actor_guest_id => row,
            _ => {
                return Err(AppError::EntityNotFound(format!(
                    "reservation {} not found",
                    event.reservation_id
                )))
            }
        };

        match row.status.parse().map_err(AppError::ConversionEntityError)? {
            ReservationStatus::Cancelled => return Err(AppError::AlreadyCancelled),
            ReservationStatus::Pending => {}
        }
        if row.paid_with_points {
            return Err(AppError::PointsBookingNotCancellable);
        }
        let charge_id = row.charge_id.clone().ok_or_else(|| {
            AppError::ConversionEntityError(format!(
                "reservation {} has no recorded charge",
                event.reservation_id
            ))
        })?;

        let guest = lock_guest(&mut tx, row.user_id).await?;

        let res = sqlx::query(
            r#"
                UPDATE reservations
                SET status = 'cancelled', updated_at = CURRENT_TIMESTAMP(3)
                WHERE reservation_id = $1
            "#,
        )
        .bind(event.reservation_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;
        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "no reservation record has been cancelled".into(),
            ));
        }

        // Freeing inventory is nothing more than flipping the claims:
        // the availability query stops counting them.
        sqlx::query(
            r#"
                UPDATE inventory_claims
                SET status = 'cancelled', updated_at = CURRENT_TIMESTAMP(3)
                WHERE reservation_id = $1 AND status = 'pending'
            "#,
        )
        .bind(event.reservation_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        self.payment
            .refund(&charge_id)
            .await
            .map_err(|e| AppError::RefundFailed(e.to_string()))?;

        let customer_ref = guest
            .payment_customer_ref
            .as_deref()
            .ok_or_else(|| AppError::FeeChargeFailed("guest has no payment account".into()))?;
        let fee_charge_id = self
            .payment
            .charge(self.cancellation_fee_cents, &self.currency, customer_ref, None)
            .await
            .map_err(|e| AppError::FeeChargeFailed(e.to_string()))?;

        // Past this point the refund and the fee have settled at the
        // provider. A commit failure leaves the reservation active while
        // the money already moved, which an operator has to reconcile.
        tx.commit().await.map_err(|e| {
            tracing::error!(
                reservation_id = %event.reservation_id,
                refunded_charge_id = %charge_id,
                %fee_charge_id,
                "cancellation failed to commit after refund and fee settled; reconciliation required"
            );
            AppError::TransactionError(e)
        })?;

        Ok(CancellationReceipt {
            reservation_id: event.reservation_id,
            refunded_charge_id: charge_id,
            fee_charge_id,
            fee_cents: self.cancellation_fee_cents,
        })
    }

    async fn find_by_id(&self, reservation_id: ReservationId) -> AppResult<Reservation> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
                SELECT
                    reservation_id,
                    hotel_id,
                    user_id,
                    start_date,
                    end_date,
                    status,
                    total_cost_cents,
                    charge_id,
                    paid_with_points
                FROM reservations
                WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        let row = row.ok_or_else(|| {
            AppError::EntityNotFound(format!("reservation {reservation_id} not found"))
        })?;
        let claims = find_claims(self.db.inner_ref(), &[reservation_id.raw()]).await?;
        row.into_reservation(claims)
    }

    async fn find_active_by_guest(&self, guest_id: UserId) -> AppResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
                SELECT
                    reservation_id,
                    hotel_id,
                    user_id,
                    start_date,
                    end_date,
                    status,
                    total_cost_cents,
                    charge_id,
                    paid_with_points
                FROM reservations
                WHERE user_id = $1 AND status = 'pending'
                ORDER BY created_at DESC
            "#,
        )
        .bind(guest_id)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        let reservation_ids: Vec<Uuid> = rows.iter().map(|r| r.reservation_id.raw()).collect();
        let mut claims_by_reservation: HashMap<ReservationId, Vec<InventoryClaim>> = HashMap::new();
        for claim in find_claims(self.db.inner_ref(), &reservation_ids).await? {
            claims_by_reservation
                .entry(claim.reservation_id)
                .or_default()
                .push(claim);
        }

        rows.into_iter()
            .map(|row| {
                let claims = claims_by_reservation
                    .remove(&row.reservation_id)
                    .unwrap_or_default();
                row.into_reservation(claims)
            })
            .collect()
    }
}

/// Collapse request lines into one count per room type, keeping the
/// order of first mention. Two lines for the same type must be summed
/// before the availability check or each line would be checked against
/// the full remainder.
fn aggregate_units(
    units: &[kernel::model::reservation::event::RequestedUnit],
) -> AppResult<Vec<(RoomTypeId, u32)>> {
    if units.is_empty() {
        return Err(AppError::InvalidRequest(
            "a booking needs at least one room".into(),
        ));
    }
    let mut aggregated: Vec<(RoomTypeId, u32)> = Vec::new();
    for unit in units {
        if unit.count == 0 {
            return Err(AppError::InvalidRequest(
                "room counts must be at least 1".into(),
            ));
        }
        match aggregated.iter_mut().find(|(id, _)| *id == unit.room_type_id) {
            Some((_, count)) => *count += unit.count,
            None => aggregated.push((unit.room_type_id, unit.count)),
        }
    }
    Ok(aggregated)
}

fn charge_error(e: PaymentError) -> AppError {
    match e {
        PaymentError::Declined(msg) => AppError::PaymentDeclined(msg),
        PaymentError::Unavailable(msg) => AppError::PaymentUnavailable(msg),
    }
}

async fn lock_guest(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    guest_id: UserId,
) -> AppResult<Guest> {
    let row: Option<GuestRow> = sqlx::query_as(
        r#"
            SELECT user_id, email, points, payment_customer_ref
            FROM users
            WHERE user_id = $1
            FOR UPDATE
        "#,
    )
    .bind(guest_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(AppError::SpecificOperationError)?;

    row.map(Guest::from)
        .ok_or_else(|| AppError::EntityNotFound(format!("guest {guest_id} not found")))
}

// The conflict guard: a non-cancelled reservation of the same guest at a
// different hotel overlapping the requested range blocks the booking.
// Re-booking the same hotel is allowed. The handful of pending stays a
// guest holds elsewhere are fetched and checked through `DateRange`, the
// single owner of the half-open overlap rule.
async fn has_conflict(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    guest_id: UserId,
    hotel_id: HotelId,
    term: DateRange,
) -> AppResult<bool> {
    let stays: Vec<(chrono::NaiveDate, chrono::NaiveDate)> = sqlx::query_as(
        r#"
            SELECT start_date, end_date
            FROM reservations
            WHERE user_id = $1
              AND hotel_id <> $2
              AND status = 'pending'
        "#,
    )
    .bind(guest_id)
    .bind(hotel_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(AppError::SpecificOperationError)?;

    Ok(stays
        .into_iter()
        .filter_map(|(start, end)| DateRange::new(start, end))
        .any(|stay| stay.overlaps(&term)))
}

async fn lock_room_types(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    hotel_id: HotelId,
    units: &[(RoomTypeId, u32)],
) -> AppResult<Vec<RoomType>> {
    let requested_ids: Vec<Uuid> = units.iter().map(|(id, _)| id.raw()).collect();
    let rows: Vec<crate::database::model::hotel::RoomTypeRow> = sqlx::query_as(
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
            WHERE hotel_id = $1 AND room_type_id = ANY($2)
            FOR UPDATE
        "#,
    )
    .bind(hotel_id)
    .bind(&requested_ids)
    .fetch_all(&mut **tx)
    .await
    .map_err(AppError::SpecificOperationError)?;

    let room_types: Vec<RoomType> = rows.into_iter().map(RoomType::from).collect();
    for (room_type_id, _) in units {
        if !room_types.iter().any(|rt| rt.room_type_id == *room_type_id) {
            return Err(AppError::InvalidRequest(format!(
                "room type {room_type_id} does not belong to hotel {hotel_id}"
            )));
        }
    }
    Ok(room_types)
}

async fn count_overlapping_claims<'e, E>(
    executor: E,
    hotel_id: HotelId,
    room_type_ids: &[Uuid],
    term: DateRange,
) -> AppResult<HashMap<RoomTypeId, i64>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows: Vec<ClaimCountRow> = sqlx::query_as(
        r#"
            SELECT room_type_id, COUNT(*) AS claimed
            FROM inventory_claims
            WHERE hotel_id = $1
              AND room_type_id = ANY($2)
              AND status = 'pending'
              AND start_date < $3
              AND end_date > $4
            GROUP BY room_type_id
        "#,
    )
    .bind(hotel_id)
    .bind(room_type_ids)
    .bind(term.end())
    .bind(term.start())
    .fetch_all(executor)
    .await
    .map_err(AppError::SpecificOperationError)?;

    Ok(rows
        .into_iter()
        .map(|row| (row.room_type_id, row.claimed))
        .collect())
}

async fn insert_reservation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    reservation_id: ReservationId,
    event: &CreateBooking,
    total_cost_cents: i64,
    paid_with_points: bool,
) -> AppResult<()> {
    let res = sqlx::query(
        r#"
            INSERT INTO reservations
            (reservation_id, hotel_id, user_id, start_date, end_date,
             status, total_cost_cents, paid_with_points)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
        "#,
    )
    .bind(reservation_id)
    .bind(event.hotel_id)
    .bind(event.guest_id)
    .bind(event.term.start())
    .bind(event.term.end())
    .bind(total_cost_cents)
    .bind(paid_with_points)
    .execute(&mut **tx)
    .await
    .map_err(AppError::SpecificOperationError)?;

    if res.rows_affected() < 1 {
        return Err(AppError::NoRowsAffectedError(
            "no reservation record has been created".into(),
        ));
    }
    Ok(())
}

// One ledger row per physical room: a line asking for three doubles
// inserts three claims.
async fn insert_claims(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    reservation_id: ReservationId,
    event: &CreateBooking,
    units: &[(RoomTypeId, u32)],
) -> AppResult<Vec<InventoryClaim>> {
    let mut claims = Vec::new();
    for (room_type_id, count) in units {
        for _ in 0..*count {
            let claim_id = ClaimId::new();
            let res = sqlx::query(
                r#"
                    INSERT INTO inventory_claims
                    (claim_id, hotel_id, room_type_id, reservation_id,
                     start_date, end_date, status)
                    VALUES ($1, $2, $3, $4, $5, $6, 'pending')
                "#,
            )
            .bind(claim_id)
            .bind(event.hotel_id)
            .bind(*room_type_id)
            .bind(reservation_id)
            .bind(event.term.start())
            .bind(event.term.end())
            .execute(&mut **tx)
            .await
            .map_err(AppError::SpecificOperationError)?;
            if res.rows_affected() < 1 {
                return Err(AppError::NoRowsAffectedError(
                    "no inventory claim has been created".into(),
                ));
            }
            claims.push(InventoryClaim {
                claim_id,
                hotel_id: event.hotel_id,
                room_type_id: *room_type_id,
                reservation_id,
                term: event.term,
                status: ClaimStatus::Pending,
            });
        }
    }
    Ok(claims)
}

// Redemption debits POINTS_PER_CENT points per cent of cost. The balance
// check and the debit are a single guarded UPDATE, and the guest row is
// already locked, so the balance cannot be spent twice.
async fn redeem_points(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    guest_id: UserId,
    total_cost_cents: i64,
) -> AppResult<()> {
    let required = total_cost_cents * POINTS_PER_CENT;
    let res = sqlx::query(
        r#"
            UPDATE users
            SET points = points - $1, updated_at = CURRENT_TIMESTAMP(3)
            WHERE user_id = $2 AND points >= $1
        "#,
    )
    .bind(required)
    .bind(guest_id)
    .execute(&mut **tx)
    .await
    .map_err(AppError::SpecificOperationError)?;

    if res.rows_affected() < 1 {
        return Err(AppError::PaymentDeclined(format!(
            "insufficient reward points: {required} required"
        )));
    }
    Ok(())
}

async fn set_charge_id(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    reservation_id: ReservationId,
    charge_id: &str,
) -> AppResult<()> {
    sqlx::query(
        r#"
            UPDATE reservations
            SET charge_id = $1, updated_at = CURRENT_TIMESTAMP(3)
            WHERE reservation_id = $2
        "#,
    )
    .bind(charge_id)
    .bind(reservation_id)
    .execute(&mut **tx)
    .await
    .map_err(AppError::SpecificOperationError)?;
    Ok(())
}

async fn find_claims<'e, E>(executor: E, reservation_ids: &[Uuid]) -> AppResult<Vec<InventoryClaim>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows: Vec<ClaimRow> = sqlx::query_as(
        r#"
            SELECT
                claim_id,
                hotel_id,
                room_type_id,
                reservation_id,
                start_date,
                end_date,
                status
            FROM inventory_claims
            WHERE reservation_id = ANY($1)
            ORDER BY created_at ASC
        "#,
    )
    .bind(reservation_ids)
    .fetch_all(executor)
    .await
    .map_err(AppError::SpecificOperationError)?;

    rows.into_iter().map(InventoryClaim::try_from).collect()
}

/// Covers every await between a successful card charge and transaction
/// commit. If the booking future never reaches `defuse` — the charge-id
/// write failed, commit failed, or the caller disconnected and the
/// future was dropped — the charge is refunded in a detached task so the
/// guest is not billed for a booking that does not exist.
struct RefundOnDrop {
    pending: Option<(Arc<dyn PaymentGateway>, String)>,
}

impl RefundOnDrop {
    fn armed(payment: Arc<dyn PaymentGateway>, charge_id: String) -> Self {
        Self {
            pending: Some((payment, charge_id)),
        }
    }

    fn unarmed() -> Self {
        Self { pending: None }
    }

    fn defuse(mut self) {
        self.pending = None;
    }
}

impl Drop for RefundOnDrop {
    fn drop(&mut self) {
        if let Some((payment, charge_id)) = self.pending.take() {
            tracing::warn!(%charge_id, "booking did not commit after a successful charge; refunding");
            tokio::spawn(async move {
                if let Err(e) = payment.refund(&charge_id).await {
                    tracing::error!(
                        %charge_id,
                        error.message = %e,
                        "best-effort refund failed, operator action required"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kernel::model::reservation::event::RequestedUnit;
    use sqlx::PgPool;
    use std::sync::Mutex;

    enum ChargeBehavior {
        Succeed,
        Decline,
        Unavailable,
    }

    struct StubPayment {
        charge_behavior: ChargeBehavior,
        /// Decline any charge after this many have succeeded.
        decline_after: Option<usize>,
        fail_refunds: bool,
        /// Issue this id for every charge instead of the ch_NNN sequence.
        fixed_charge_id: Option<String>,
        charges: Mutex<Vec<i64>>,
        refunds: Mutex<Vec<String>>,
    }

    impl StubPayment {
        fn with(charge_behavior: ChargeBehavior) -> Arc<Self> {
            Arc::new(Self {
                charge_behavior,
                decline_after: None,
                fail_refunds: false,
                fixed_charge_id: None,
                charges: Mutex::new(Vec::new()),
                refunds: Mutex::new(Vec::new()),
            })
        }

        fn issuing(charge_id: &str) -> Arc<Self> {
            Arc::new(Self {
                charge_behavior: ChargeBehavior::Succeed,
                decline_after: None,
                fail_refunds: false,
                fixed_charge_id: Some(charge_id.to_string()),
                charges: Mutex::new(Vec::new()),
                refunds: Mutex::new(Vec::new()),
            })
        }

        fn ok() -> Arc<Self> {
            Self::with(ChargeBehavior::Succeed)
        }

        fn declining() -> Arc<Self> {
            Self::with(ChargeBehavior::Decline)
        }

        fn unavailable() -> Arc<Self> {
            Self::with(ChargeBehavior::Unavailable)
        }

        fn refund_failing() -> Arc<Self> {
            Arc::new(Self {
                charge_behavior: ChargeBehavior::Succeed,
                decline_after: None,
                fail_refunds: true,
                fixed_charge_id: None,
                charges: Mutex::new(Vec::new()),
                refunds: Mutex::new(Vec::new()),
            })
        }

        fn declining_after(n: usize) -> Arc<Self> {
            Arc::new(Self {
                charge_behavior: ChargeBehavior::Succeed,
                decline_after: Some(n),
                fail_refunds: false,
                fixed_charge_id: None,
                charges: Mutex::new(Vec::new()),
                refunds: Mutex::new(Vec::new()),
            })
        }

        fn charged_amounts(&self) -> Vec<i64> {
            self.charges.lock().unwrap().clone()
        }

        fn refunded(&self) -> Vec<String> {
            self.refunds.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PaymentGateway for StubPayment {
        async fn charge(
            &self,
            amount_cents: i64,
            _currency: &str,
            _customer_ref: &str,
            _source_token: Option<&str>,
        ) -> Result<String, PaymentError> {
            let mut charges = self.charges.lock().unwrap();
            match self.charge_behavior {
                ChargeBehavior::Decline => {
                    return Err(PaymentError::Declined("card_declined".into()))
                }
                ChargeBehavior::Unavailable => {
                    return Err(PaymentError::Unavailable("connection reset".into()))
                }
                ChargeBehavior::Succeed => {}
            }
            if let Some(n) = self.decline_after {
                if charges.len() >= n {
                    return Err(PaymentError::Declined("card_declined".into()));
                }
            }
            charges.push(amount_cents);
            Ok(match &self.fixed_charge_id {
                Some(id) => id.clone(),
                None => format!("ch_{:03}", charges.len()),
            })
        }

        async fn refund(&self, charge_id: &str) -> Result<(), PaymentError> {
            if self.fail_refunds {
                return Err(PaymentError::Unavailable("refund endpoint down".into()));
            }
            self.refunds.lock().unwrap().push(charge_id.to_string());
            Ok(())
        }
    }

    fn repo(pool: PgPool, payment: Arc<StubPayment>) -> ReservationRepositoryImpl {
        ReservationRepositoryImpl::new(
            ConnectionPool::new(pool),
            payment as Arc<dyn PaymentGateway>,
            "usd".into(),
            5_000,
        )
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    async fn insert_hotel(pool: &PgPool, title: &str) -> HotelId {
        let hotel_id = HotelId::new();
        sqlx::query("INSERT INTO hotels (hotel_id, title) VALUES ($1, $2)")
            .bind(hotel_id)
            .bind(title)
            .execute(pool)
            .await
            .unwrap();
        hotel_id
    }

    async fn insert_room_type(
        pool: &PgPool,
        hotel_id: HotelId,
        total_units: i32,
        nightly_rate_cents: i64,
    ) -> RoomTypeId {
        let room_type_id = RoomTypeId::new();
        sqlx::query(
            r#"
                INSERT INTO room_types
                (room_type_id, hotel_id, name, capacity, beds, nightly_rate_cents, total_units)
                VALUES ($1, $2, 'Double Queen', 2, 2, $3, $4)
            "#,
        )
        .bind(room_type_id)
        .bind(hotel_id)
        .bind(nightly_rate_cents)
        .bind(total_units)
        .execute(pool)
        .await
        .unwrap();
        room_type_id
    }

    async fn insert_guest(pool: &PgPool, email: &str, points: i64) -> UserId {
        let user_id = UserId::new();
        sqlx::query(
            r#"
                INSERT INTO users (user_id, email, points, payment_customer_ref)
                VALUES ($1, $2, $3, 'cus_test')
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(points)
        .execute(pool)
        .await
        .unwrap();
        user_id
    }

    fn card_booking(
        guest_id: UserId,
        hotel_id: HotelId,
        term: DateRange,
        units: Vec<RequestedUnit>,
    ) -> CreateBooking {
        CreateBooking::new(
            guest_id,
            hotel_id,
            term,
            units,
            PaymentMethod::Card {
                source_token: "tok_visa".into(),
            },
        )
    }

    async fn count_rows(pool: &PgPool, table: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap();
        count
    }

    /// The guard refunds through a detached task, so give it a moment.
    async fn wait_for_refund(payment: &StubPayment, charge_id: &str) {
        for _ in 0..50 {
            if payment.refunded().iter().any(|id| id == charge_id) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("refund for {charge_id} was never issued");
    }

    #[sqlx::test]
    async fn booking_claims_inventory_and_charges_the_total(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 2, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let payment = StubPayment::ok();
        let repo = repo(pool.clone(), Arc::clone(&payment));

        // two rooms, two nights, 100.00/night => 400.00
        let term = range("2020-01-10", "2020-01-12");
        let reservation = repo
            .book(card_booking(
                guest,
                hotel,
                term,
                vec![RequestedUnit::new(room, 2)],
            ))
            .await
            .unwrap();

        assert_eq!(reservation.total_cost_cents, 40_000);
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.claims.len(), 2);
        assert_eq!(payment.charged_amounts(), vec![40_000]);

        let availability = repo.availability(hotel, term).await.unwrap();
        assert_eq!(availability[0].units_available, 0);

        let reread = repo.find_by_id(reservation.reservation_id).await.unwrap();
        assert_eq!(reread.claims.len(), 2);
        assert_eq!(reread.charge_id.as_deref(), Some("ch_001"));
    }

    #[sqlx::test]
    async fn availability_reads_are_stable_without_writes(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        insert_room_type(&pool, hotel, 3, 10_000).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        let term = range("2020-01-10", "2020-01-12");
        let first = repo.availability(hotel, term).await.unwrap();
        let second = repo.availability(hotel, term).await.unwrap();
        assert_eq!(first, second);
    }

    #[sqlx::test]
    async fn overbooking_is_rejected(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 2, 10_000).await;
        let first = insert_guest(&pool, "first@example.com", 0).await;
        let second = insert_guest(&pool, "second@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        repo.book(card_booking(
            first,
            hotel,
            range("2020-01-10", "2020-01-12"),
            vec![RequestedUnit::new(room, 2)],
        ))
        .await
        .unwrap();

        // overlapping request for the now-exhausted type
        let err = repo
            .book(card_booking(
                second,
                hotel,
                range("2020-01-11", "2020-01-13"),
                vec![RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientInventory {
                requested: 1,
                available: 0,
                ..
            }
        ));

        // a back-to-back stay touching the checkout date shares no night
        repo.book(card_booking(
            second,
            hotel,
            range("2020-01-12", "2020-01-14"),
            vec![RequestedUnit::new(room, 1)],
        ))
        .await
        .unwrap();
    }

    #[sqlx::test]
    async fn duplicate_request_lines_are_summed_before_the_check(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 1, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        let err = repo
            .book(card_booking(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(room, 1), RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientInventory { .. }));
    }

    #[sqlx::test]
    async fn declined_charge_leaves_no_trace(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 2, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::declining());

        let err = repo
            .book(card_booking(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentDeclined(_)));

        assert_eq!(count_rows(&pool, "reservations").await, 0);
        assert_eq!(count_rows(&pool, "inventory_claims").await, 0);
    }

    #[sqlx::test]
    async fn provider_outage_rolls_back_and_reports_unavailable(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 2, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::unavailable());

        let err = repo
            .book(card_booking(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentUnavailable(_)));
        assert_eq!(count_rows(&pool, "reservations").await, 0);
    }

    #[sqlx::test]
    async fn a_charge_that_cannot_be_recorded_is_refunded(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 1, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        // an id the charge_id column cannot hold: the provider settles
        // the charge, then the charge-id write fails inside the
        // transaction
        let oversized = "ch_".repeat(100);
        let payment = StubPayment::issuing(&oversized);
        let repo = repo(pool.clone(), Arc::clone(&payment));

        let err = repo
            .book(card_booking(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SpecificOperationError(_)));

        assert_eq!(count_rows(&pool, "reservations").await, 0);
        assert_eq!(payment.charged_amounts(), vec![20_000]);
        wait_for_refund(&payment, &oversized).await;
    }

    #[tokio::test]
    async fn an_undefused_refund_guard_refunds_the_charge() {
        let payment = StubPayment::ok();
        drop(RefundOnDrop::armed(
            Arc::clone(&payment) as Arc<dyn PaymentGateway>,
            "ch_orphan".into(),
        ));
        wait_for_refund(&payment, "ch_orphan").await;

        // a defused guard stays quiet
        let defused = StubPayment::ok();
        RefundOnDrop::armed(
            Arc::clone(&defused) as Arc<dyn PaymentGateway>,
            "ch_kept".into(),
        )
        .defuse();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(defused.refunded().is_empty());
    }

    #[sqlx::test]
    async fn points_redemption_debits_twice_the_cost(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 2, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 100_000).await;
        let payment = StubPayment::ok();
        let repo = repo(pool.clone(), Arc::clone(&payment));

        let reservation = repo
            .book(CreateBooking::new(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(room, 2)],
                PaymentMethod::Points,
            ))
            .await
            .unwrap();

        assert!(reservation.paid_with_points);
        assert!(reservation.charge_id.is_none());
        assert!(payment.charged_amounts().is_empty());

        let (points,): (i64,) = sqlx::query_as("SELECT points FROM users WHERE user_id = $1")
            .bind(guest)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(points, 100_000 - 2 * 40_000);
    }

    #[sqlx::test]
    async fn short_point_balance_declines_without_debiting(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 2, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 50_000).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        let err = repo
            .book(CreateBooking::new(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(room, 2)],
                PaymentMethod::Points,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentDeclined(_)));

        assert_eq!(count_rows(&pool, "reservations").await, 0);
        let (points,): (i64,) = sqlx::query_as("SELECT points FROM users WHERE user_id = $1")
            .bind(guest)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(points, 50_000);
    }

    #[sqlx::test]
    async fn overlapping_stay_at_another_hotel_is_blocked(pool: PgPool) {
        let hotel_a = insert_hotel(&pool, "Hotel A").await;
        let hotel_b = insert_hotel(&pool, "Hotel B").await;
        let room_a = insert_room_type(&pool, hotel_a, 2, 10_000).await;
        let room_b = insert_room_type(&pool, hotel_b, 2, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        repo.book(card_booking(
            guest,
            hotel_a,
            range("2020-01-10", "2020-01-12"),
            vec![RequestedUnit::new(room_a, 1)],
        ))
        .await
        .unwrap();

        let err = repo
            .book(card_booking(
                guest,
                hotel_b,
                range("2020-01-11", "2020-01-13"),
                vec![RequestedUnit::new(room_b, 1)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConflictingReservation));

        // the same guest may book more rooms at the same hotel
        repo.book(card_booking(
            guest,
            hotel_a,
            range("2020-01-11", "2020-01-13"),
            vec![RequestedUnit::new(room_a, 1)],
        ))
        .await
        .unwrap();
    }

    #[sqlx::test]
    async fn cancellation_frees_inventory_and_settles_refund_then_fee(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 1, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let payment = StubPayment::ok();
        let repo = repo(pool.clone(), Arc::clone(&payment));

        let term = range("2020-01-10", "2020-01-12");
        let reservation = repo
            .book(card_booking(
                guest,
                hotel,
                term,
                vec![RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap();
        assert_eq!(repo.availability(hotel, term).await.unwrap()[0].units_available, 0);

        let receipt = repo
            .cancel(CancelBooking::new(reservation.reservation_id, guest))
            .await
            .unwrap();
        assert_eq!(receipt.refunded_charge_id, "ch_001");
        assert_eq!(receipt.fee_cents, 5_000);
        assert_eq!(payment.refunded(), vec!["ch_001".to_string()]);
        assert_eq!(payment.charged_amounts(), vec![20_000, 5_000]);

        // the single unit is bookable again
        assert_eq!(repo.availability(hotel, term).await.unwrap()[0].units_available, 1);

        // the ledger keeps the cancelled claims for audit
        assert_eq!(count_rows(&pool, "inventory_claims").await, 1);
        let reread = repo.find_by_id(reservation.reservation_id).await.unwrap();
        assert_eq!(reread.status, ReservationStatus::Cancelled);
        assert_eq!(reread.claims[0].status, ClaimStatus::Cancelled);
    }

    #[sqlx::test]
    async fn cancel_is_owner_only_and_single_shot(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 1, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let stranger = insert_guest(&pool, "stranger@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        let err = repo
            .cancel(CancelBooking::new(ReservationId::new(), guest))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound(_)));

        let reservation = repo
            .book(card_booking(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap();

        let err = repo
            .cancel(CancelBooking::new(reservation.reservation_id, stranger))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound(_)));

        repo.cancel(CancelBooking::new(reservation.reservation_id, guest))
            .await
            .unwrap();
        let err = repo
            .cancel(CancelBooking::new(reservation.reservation_id, guest))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyCancelled));
    }

    #[sqlx::test]
    async fn points_bookings_cannot_be_cancelled(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 1, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 100_000).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        let reservation = repo
            .book(CreateBooking::new(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(room, 1)],
                PaymentMethod::Points,
            ))
            .await
            .unwrap();

        let err = repo
            .cancel(CancelBooking::new(reservation.reservation_id, guest))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PointsBookingNotCancellable));
    }

    #[sqlx::test]
    async fn failed_refund_keeps_the_reservation_active(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 1, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::refund_failing());

        let term = range("2020-01-10", "2020-01-12");
        let reservation = repo
            .book(card_booking(
                guest,
                hotel,
                term,
                vec![RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap();

        let err = repo
            .cancel(CancelBooking::new(reservation.reservation_id, guest))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RefundFailed(_)));

        // rollback: reservation still pending, inventory still held
        let reread = repo.find_by_id(reservation.reservation_id).await.unwrap();
        assert_eq!(reread.status, ReservationStatus::Pending);
        assert_eq!(repo.availability(hotel, term).await.unwrap()[0].units_available, 0);
    }

    #[sqlx::test]
    async fn failed_fee_charge_rolls_the_cancellation_back(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 1, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        // the booking charge succeeds, the fee charge declines
        let payment = StubPayment::declining_after(1);
        let repo = repo(pool.clone(), Arc::clone(&payment));

        let term = range("2020-01-10", "2020-01-12");
        let reservation = repo
            .book(card_booking(
                guest,
                hotel,
                term,
                vec![RequestedUnit::new(room, 1)],
            ))
            .await
            .unwrap();

        let err = repo
            .cancel(CancelBooking::new(reservation.reservation_id, guest))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FeeChargeFailed(_)));

        let reread = repo.find_by_id(reservation.reservation_id).await.unwrap();
        assert_eq!(reread.status, ReservationStatus::Pending);
        assert_eq!(reread.claims[0].status, ClaimStatus::Pending);
    }

    #[sqlx::test]
    async fn concurrent_bookers_cannot_oversell_a_single_unit(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let room = insert_room_type(&pool, hotel, 1, 10_000).await;
        let alice = insert_guest(&pool, "alice@example.com", 0).await;
        let bob = insert_guest(&pool, "bob@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        let term = range("2020-01-10", "2020-01-12");
        let (a, b) = tokio::join!(
            repo.book(card_booking(
                alice,
                hotel,
                term,
                vec![RequestedUnit::new(room, 1)],
            )),
            repo.book(card_booking(
                bob,
                hotel,
                term,
                vec![RequestedUnit::new(room, 1)],
            )),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            loser.as_ref().unwrap_err(),
            AppError::InsufficientInventory { .. }
        ));
        assert_eq!(count_rows(&pool, "inventory_claims").await, 1);
    }

    #[sqlx::test]
    async fn unknown_room_type_is_a_caller_error(pool: PgPool) {
        let hotel = insert_hotel(&pool, "Hotel H").await;
        let other_hotel = insert_hotel(&pool, "Hotel B").await;
        insert_room_type(&pool, hotel, 2, 10_000).await;
        let foreign_room = insert_room_type(&pool, other_hotel, 2, 10_000).await;
        let guest = insert_guest(&pool, "guest@example.com", 0).await;
        let repo = repo(pool.clone(), StubPayment::ok());

        let err = repo
            .book(card_booking(
                guest,
                hotel,
                range("2020-01-10", "2020-01-12"),
                vec![RequestedUnit::new(foreign_room, 1)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert_eq!(count_rows(&pool, "reservations").await, 0);
    }
}
