use anyhow::Result;
use std::time::Duration;

/// Explicit configuration object assembled once at startup and handed to
/// the registry. Nothing in the engine reads process-wide state after this.
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
    pub notification: NotificationConfig,
    pub booking: BookingConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self> {
        let database = DatabaseConfig {
            host: std::env::var("DATABASE_HOST")?,
            port: std::env::var("DATABASE_PORT")?.parse()?,
            username: std::env::var("DATABASE_USERNAME")?,
            password: std::env::var("DATABASE_PASSWORD")?,
            database: std::env::var("DATABASE_NAME")?,
        };
        let payment = PaymentConfig {
            base_url: std::env::var("PAYMENT_BASE_URL")?,
            secret_key: std::env::var("PAYMENT_SECRET_KEY")?,
            currency: std::env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "usd".into()),
            timeout: Duration::from_millis(
                std::env::var("PAYMENT_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".into())
                    .parse()?,
            ),
        };
        let notification = NotificationConfig {
            base_url: std::env::var("NOTIFICATION_BASE_URL")?,
        };
        let booking = BookingConfig {
            cancellation_fee_cents: std::env::var("CANCELLATION_FEE_CENTS")
                .unwrap_or_else(|_| "5000".into())
                .parse()?,
        };
        Ok(Self {
            database,
            payment,
            notification,
            booking,
        })
    }
}

pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

pub struct PaymentConfig {
    pub base_url: String,
    pub secret_key: String,
    pub currency: String,
    /// Upper bound on a single charge/refund call. A timed-out charge is
    /// treated as unavailable and the booking transaction is rolled back.
    pub timeout: Duration,
}

pub struct NotificationConfig {
    pub base_url: String,
}

pub struct BookingConfig {
    /// Flat fee charged on cancellation, in minor units.
    pub cancellation_fee_cents: i64,
}
