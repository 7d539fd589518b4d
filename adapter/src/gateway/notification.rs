use async_trait::async_trait;
use kernel::gateway::notification::NotificationGateway;
use kernel::model::id::UserId;
use shared::config::NotificationConfig;
use shared::error::{AppError, AppResult};

/// Posts notification jobs to the notification service. Delivery is the
/// service's concern; callers treat any error here as log-and-forget.
pub struct HttpNotificationGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationGateway {
    pub fn new(cfg: &NotificationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn send(
        &self,
        user_id: UserId,
        template: &str,
        data: serde_json::Value,
    ) -> AppResult<()> {
        self.client
            .post(format!("{}/notifications", self.base_url))
            .json(&serde_json::json!({
                "userId": user_id,
                "template": template,
                "data": data,
            }))
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AppError::NotificationError(e.to_string()))?;
        Ok(())
    }
}
