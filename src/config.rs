//! Service configuration, read once at startup from the environment.

use anyhow::Context as _;
use chrono_tz::Tz;

/// All task times are wall-clock times in this zone, matching how the
/// CRUD layer stores them.
pub const TIMEZONE: Tz = chrono_tz::Europe::Paris;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub smtp: SmtpConfig,
    /// Recipient of the evening summary.
    pub boss_email: String,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Whether to use implicit TLS; otherwise STARTTLS is attempted.
    pub secure: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Ok(Config {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            smtp: SmtpConfig::from_env()?,
            boss_email: std::env::var("BOSS_EMAIL").context("BOSS_EMAIL is not set")?,
        })
    }
}

impl SmtpConfig {
    fn from_env() -> anyhow::Result<SmtpConfig> {
        Ok(SmtpConfig {
            host: std::env::var("EMAIL_HOST").context("EMAIL_HOST is not set")?,
            port: std::env::var("EMAIL_PORT")
                .context("EMAIL_PORT is not set")?
                .parse()
                .context("EMAIL_PORT is not a port number")?,
            username: std::env::var("EMAIL_USER").context("EMAIL_USER is not set")?,
            password: std::env::var("EMAIL_PASS").context("EMAIL_PASS is not set")?,
            secure: std::env::var("EMAIL_SECURE").map_or(false, |v| v == "true"),
        })
    }

    /// The `From` header used on every outgoing mail.
    pub fn sender(&self) -> String {
        format!("\"MyTâches\" <{}>", self.username)
    }
}
