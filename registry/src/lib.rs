use std::sync::Arc;

use adapter::database::ConnectionPool;
use adapter::repository::health::HealthCheckRepositoryImpl;
use adapter::repository::hotel::HotelRepositoryImpl;
use adapter::repository::reservation::ReservationRepositoryImpl;
use kernel::gateway::notification::NotificationGateway;
use kernel::gateway::payment::PaymentGateway;
use kernel::repository::health::HealthCheckRepository;
use kernel::repository::hotel::HotelRepository;
use kernel::repository::reservation::ReservationRepository;
use shared::config::AppConfig;

#[derive(Clone)]
pub struct AppRegistry {
    health_check_repository: Arc<dyn HealthCheckRepository>,
    hotel_repository: Arc<dyn HotelRepository>,
    reservation_repository: Arc<dyn ReservationRepository>,
    notification_gateway: Arc<dyn NotificationGateway>,
}

impl AppRegistry {
    pub fn new(
        pool: ConnectionPool,
        payment_gateway: Arc<dyn PaymentGateway>,
        notification_gateway: Arc<dyn NotificationGateway>,
        app_config: &AppConfig,
    ) -> Self {
        let health_check_repository = Arc::new(HealthCheckRepositoryImpl::new(pool.clone()));
        let hotel_repository = Arc::new(HotelRepositoryImpl::new(pool.clone()));
        let reservation_repository = Arc::new(ReservationRepositoryImpl::new(
            pool.clone(),
            payment_gateway,
            app_config.payment.currency.clone(),
            app_config.booking.cancellation_fee_cents,
        ));
        Self {
            health_check_repository,
            hotel_repository,
            reservation_repository,
            notification_gateway,
        }
    }

    pub fn health_check_repository(&self) -> Arc<dyn HealthCheckRepository> {
        self.health_check_repository.clone()
    }

    pub fn hotel_repository(&self) -> Arc<dyn HotelRepository> {
        self.hotel_repository.clone()
    }

    pub fn reservation_repository(&self) -> Arc<dyn ReservationRepository> {
        self.reservation_repository.clone()
    }

    pub fn notification_gateway(&self) -> Arc<dyn NotificationGateway> {
        self.notification_gateway.clone()
    }
}
