use async_trait::async_trait;

/// How a payment call failed. The split decides retryability: a declined
/// charge needs user action, an unavailable provider can be retried by
/// the caller because the surrounding transaction rolled back without
/// effect.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("{0}")]
    Declined(String),
    #[error("{0}")]
    Unavailable(String),
}

/// External charge/refund capability (Stripe-shaped). Implementations
/// must bound each call with a timeout; a timeout is `Unavailable`,
/// never assumed success.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount_cents` against the customer. `source_token` is a
    /// one-time card token when present; otherwise the customer's stored
    /// default source is used (cancellation fees work this way).
    async fn charge(
        &self,
        amount_cents: i64,
        currency: &str,
        customer_ref: &str,
        source_token: Option<&str>,
    ) -> Result<String, PaymentError>;

    async fn refund(&self, charge_id: &str) -> Result<(), PaymentError>;
}
