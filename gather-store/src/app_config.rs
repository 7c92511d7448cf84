use gather_shared::Masked;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Enables rate limiting when present.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Enables domain-event publishing when present.
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 { 60 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Masked<String>,
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_seconds: u64,
    pub admin_password: Masked<String>,
}

fn default_jwt_expiration() -> u64 { 3600 }

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    pub key_id: String,
    /// Also the HMAC key for payment signatures. Required, no fallback.
    pub key_secret: Masked<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_ms: u64,
}

fn default_gateway_url() -> String { "https://api.razorpay.com".into() }
fn default_currency() -> String { "INR".into() }
fn default_gateway_timeout() -> u64 { 5000 }

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    #[serde(default = "default_persist_attempts")]
    pub persist_attempts: u32,
    #[serde(default = "default_persist_backoff")]
    pub persist_backoff_ms: u64,
    #[serde(default = "default_persist_backoff_max")]
    pub persist_backoff_max_ms: u64,
}

fn default_persist_attempts() -> u32 { 5 }
fn default_persist_backoff() -> u64 { 200 }
fn default_persist_backoff_max() -> u64 { 5000 }

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            persist_attempts: default_persist_attempts(),
            persist_backoff_ms: default_persist_backoff(),
            persist_backoff_max_ms: default_persist_backoff_max(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default)]
    pub chat_phone: String,
    #[serde(default = "default_email_timeout")]
    pub email_timeout_ms: u64,
    #[serde(default = "default_email_attempts")]
    pub email_attempts: u32,
    /// Without SMTP settings confirmation e-mails are skipped.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

fn default_email_timeout() -> u64 { 8000 }
fn default_email_attempts() -> u32 { 3 }

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            chat_phone: String::new(),
            email_timeout_ms: default_email_timeout(),
            email_attempts: default_email_attempts(),
            smtp: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: Masked<String>,
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 { 587 }
fn default_from_name() -> String { "Bookings".into() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `GATHER__GATEWAY__KEY_SECRET=...`
            .add_source(config::Environment::with_prefix("GATHER").separator("__"))
            .build()?;

        Self::from_settings(s)
    }

    pub fn from_settings(settings: config::Config) -> Result<Self, config::ConfigError> {
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Secrets have no defaults: a missing or blank value is fatal.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let required = [
            ("gateway.key_id", self.gateway.key_id.as_str()),
            ("gateway.key_secret", self.gateway.key_secret.expose().as_str()),
            ("auth.jwt_secret", self.auth.jwt_secret.expose().as_str()),
            ("auth.admin_password", self.auth.admin_password.expose().as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(config::ConfigError::Message(format!("{} must be set", key)));
            }
        }

        let currency = &self.gateway.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(config::ConfigError::Message(format!(
                "gateway.currency must be an upper-case ISO code, got {}",
                currency
            )));
        }
        if self.booking.persist_attempts == 0 || self.notifications.email_attempts == 0 {
            return Err(config::ConfigError::Message("attempt counts must be at least 1".into()));
        }
        Ok(())
    }
}
