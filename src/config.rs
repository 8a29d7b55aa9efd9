use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://oficina.ista.es";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Widest window the portal accepts for one report
pub const MAX_DAYS_PER_REQUEST: i64 = 240;

#[derive(Clone)]
pub struct Config {
    pub email: String,
    pub password: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_days_per_request: i64,
}

impl Config {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
            password: password.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_days_per_request: MAX_DAYS_PER_REQUEST,
        }
    }

    pub fn from_env() -> Result<Self, env::VarError> {
        let config = Config::new(env::var("CALISTA_EMAIL")?, env::var("CALISTA_PASSWORD")?)
            .with_base_url(
                env::var("CALISTA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            )
            .with_timeout(Duration::from_secs(
                env::var("CALISTA_TIMEOUT_SECS")
                    .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ))
            .with_max_days_per_request(
                env::var("CALISTA_MAX_DAYS_PER_REQUEST")
                    .unwrap_or_else(|_| MAX_DAYS_PER_REQUEST.to_string())
                    .parse()
                    .unwrap_or(MAX_DAYS_PER_REQUEST),
            );
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Clamped to 1..=240 days
    pub fn with_max_days_per_request(mut self, days: i64) -> Self {
        self.max_days_per_request = days.clamp(1, MAX_DAYS_PER_REQUEST);
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("password", &"********")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_days_per_request", &self.max_days_per_request)
            .finish()
    }
}
