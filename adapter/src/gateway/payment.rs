use async_trait::async_trait;
use kernel::gateway::payment::{PaymentError, PaymentGateway};
use serde::Deserialize;
use shared::config::PaymentConfig;

/// Client for a Stripe-shaped charge/refund HTTP API. Every call is
/// bounded by the configured timeout; a timeout or transport error maps
/// to `Unavailable` — success is never assumed.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct ChargeResponse {
    id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

impl HttpPaymentGateway {
    pub fn new(cfg: &PaymentConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    async fn classify_failure(res: reqwest::Response) -> PaymentError {
        let status = res.status();
        match res.json::<ErrorBody>().await {
            // card_error is the decline class: the guest has to act.
            // Everything else is the provider's problem and retryable.
            Ok(body) if body.error.kind == "card_error" => PaymentError::Declined(body.error.message),
            Ok(body) => PaymentError::Unavailable(body.error.message),
            Err(_) => PaymentError::Unavailable(format!("provider returned {status}")),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(
        &self,
        amount_cents: i64,
        currency: &str,
        customer_ref: &str,
        source_token: Option<&str>,
    ) -> Result<String, PaymentError> {
        let mut form = vec![
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_string()),
            ("customer", customer_ref.to_string()),
        ];
        if let Some(token) = source_token {
            form.push(("source", token.to_string()));
        }

        let res = self
            .client
            .post(format!("{}/v1/charges", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        if !res.status().is_success() {
            return Err(Self::classify_failure(res).await);
        }
        let charge: ChargeResponse = res
            .json()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;
        Ok(charge.id)
    }

    async fn refund(&self, charge_id: &str) -> Result<(), PaymentError> {
        let res = self
            .client
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[("charge", charge_id)])
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        if !res.status().is_success() {
            return Err(Self::classify_failure(res).await);
        }
        Ok(())
    }
}
