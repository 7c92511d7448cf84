pub mod app_config;
pub mod database;
pub mod catalog_repo;
pub mod capacity_repo;
pub mod booking_repo;
pub mod gateway;
pub mod mailer;
pub mod redis_repo;
pub mod events;

pub use app_config::Config;
pub use database::DbClient;
pub use catalog_repo::PgEventCatalog;
pub use capacity_repo::PgCapacityLedger;
pub use booking_repo::PgBookingStore;
pub use gateway::HttpPaymentGateway;
pub use mailer::{DisabledMailer, SmtpMailer};
pub use redis_repo::RedisClient;
pub use events::EventProducer;
