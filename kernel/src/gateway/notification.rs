use async_trait::async_trait;
use shared::error::AppResult;

use crate::model::id::UserId;

/// Best-effort notification delivery. Callers fire these after commit
/// and log failures; a notification error never affects a booking or
/// cancellation outcome.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, user_id: UserId, template: &str, data: serde_json::Value)
        -> AppResult<()>;
}
