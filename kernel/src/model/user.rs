use crate::model::id::UserId;

/// The slice of the user entity the engine is allowed to see. Identity is
/// owned by an external collaborator; the engine reads it and only ever
/// writes point-balance deltas (on redemption).
#[derive(Debug, PartialEq, Eq)]
pub struct Guest {
    pub user_id: UserId,
    pub email: String,
    pub points: i64,
    /// Customer handle at the payment provider, if the guest has one.
    pub payment_customer_ref: Option<String>,
}
