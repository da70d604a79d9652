//! Configuration for Tallyho
//!
//! CLI arguments and environment variable handling using clap. Every flag
//! can also be set through the environment (or a `.env` file).

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::auth::{HashCost, PasswordPolicy, Policies, TokenExpiry, TokenService, UsernamePolicy};
use crate::notify::WelcomeTemplate;
use crate::types::{Result, TallyError};

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Tallyho runtime configuration
#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// Development mode: in-memory stores, built-in JWT secret, emails logged
    /// instead of sent. Nothing is kept between runs, so commands that need an
    /// earlier registration (login, account, like, strike) are refused.
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "tallyho")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Session token lifetime, e.g. "2 days", "12h", "90 minutes"
    #[arg(long, env = "TOKEN_EXPIRY", default_value = "2 days")]
    pub token_expiry: TokenExpiry,

    /// Argon2 memory cost in KiB
    #[arg(long, env = "HASH_MEMORY_KIB", default_value = "19456")]
    pub hash_memory_kib: u32,

    /// Argon2 iteration count
    #[arg(long, env = "HASH_ITERATIONS", default_value = "2")]
    pub hash_iterations: u32,

    /// Argon2 parallelism
    #[arg(long, env = "HASH_PARALLELISM", default_value = "1")]
    pub hash_parallelism: u32,

    #[arg(long, env = "USERNAME_MIN_LENGTH", default_value = "3")]
    pub username_min_length: usize,

    #[arg(long, env = "USERNAME_MAX_LENGTH", default_value = "32")]
    pub username_max_length: usize,

    #[arg(long, env = "PASSWORD_MIN_LENGTH", default_value = "8")]
    pub password_min_length: usize,

    #[arg(long, env = "PASSWORD_MAX_LENGTH", default_value = "128")]
    pub password_max_length: usize,

    /// Passwords must contain at least one ASCII digit
    #[arg(long, env = "PASSWORD_REQUIRE_DIGIT", default_value = "true", action = clap::ArgAction::Set)]
    pub password_require_digit: bool,

    /// Passwords must contain at least one letter
    #[arg(long, env = "PASSWORD_REQUIRE_LETTER", default_value = "true", action = clap::ArgAction::Set)]
    pub password_require_letter: bool,

    /// Domain welcome emails are sent from
    #[arg(long, env = "MAIL_DOMAIN", default_value = "localhost")]
    pub mail_domain: String,

    /// Display name on the sending address
    #[arg(long, env = "MAIL_DISPLAY_NAME", default_value = "Tallyho")]
    pub mail_display_name: String,

    /// Mailgun API key. Without one, emails are only logged.
    #[arg(long, env = "MAILGUN_API_KEY", hide_env_values = true)]
    pub mailgun_api_key: Option<String>,

    /// Mailgun API base URL (use https://api.eu.mailgun.net for EU domains)
    #[arg(long, env = "MAILGUN_API_BASE", default_value = "https://api.mailgun.net")]
    pub mailgun_api_base: String,

    /// Product name used in emails
    #[arg(long, env = "PRODUCT_NAME", default_value = "Tallyho")]
    pub product_name: String,

    /// Frontend URL linked from emails
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:3000")]
    pub frontend_url: String,

    /// Seconds an in-progress like/strike count blocks duplicates before its
    /// receipt can be reclaimed
    #[arg(long, env = "CLAIM_LEASE_SECS", default_value = "30")]
    pub claim_lease_secs: u64,

    /// Pending outbound emails held before new ones are dropped
    #[arg(long, env = "NOTIFICATION_QUEUE_SIZE", default_value = "256")]
    pub notification_queue_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Immutable settings derived from [`Args`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub token_expiry: TokenExpiry,
    pub hash_cost: HashCost,
    pub policies: Policies,
    pub welcome: WelcomeTemplate,
    pub notification_queue_size: usize,
    pub claim_lease: Duration,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.username_min_length == 0 {
            return Err("USERNAME_MIN_LENGTH must be at least 1".to_string());
        }
        if self.username_min_length > self.username_max_length {
            return Err("USERNAME_MIN_LENGTH must be less than or equal to USERNAME_MAX_LENGTH".to_string());
        }

        if self.password_min_length == 0 {
            return Err("PASSWORD_MIN_LENGTH must be at least 1".to_string());
        }
        if self.password_min_length > self.password_max_length {
            return Err("PASSWORD_MIN_LENGTH must be less than or equal to PASSWORD_MAX_LENGTH".to_string());
        }

        if self.notification_queue_size == 0 {
            return Err("NOTIFICATION_QUEUE_SIZE must be at least 1".to_string());
        }

        if self.claim_lease_secs == 0 {
            return Err("CLAIM_LEASE_SECS must be at least 1".to_string());
        }

        if self.mail_domain.trim().is_empty() {
            return Err("MAIL_DOMAIN must not be empty".to_string());
        }

        Ok(())
    }

    pub fn hash_cost(&self) -> HashCost {
        HashCost {
            memory_kib: self.hash_memory_kib,
            iterations: self.hash_iterations,
            parallelism: self.hash_parallelism,
        }
    }

    pub fn policies(&self) -> Policies {
        Policies {
            username: UsernamePolicy {
                min_length: self.username_min_length,
                max_length: self.username_max_length,
            },
            password: PasswordPolicy {
                min_length: self.password_min_length,
                max_length: self.password_max_length,
                require_letter: self.password_require_letter,
                require_digit: self.password_require_digit,
            },
        }
    }

    pub fn welcome_template(&self) -> WelcomeTemplate {
        WelcomeTemplate {
            sender_domain: self.mail_domain.clone(),
            display_name: self.mail_display_name.clone(),
            product_name: self.product_name.clone(),
            frontend_url: self.frontend_url.clone(),
        }
    }

    /// Collect the derived settings
    pub fn settings(&self) -> Settings {
        Settings {
            token_expiry: self.token_expiry,
            hash_cost: self.hash_cost(),
            policies: self.policies(),
            welcome: self.welcome_template(),
            notification_queue_size: self.notification_queue_size,
            claim_lease: Duration::from_secs(self.claim_lease_secs),
        }
    }

    /// Refuse `command` in dev mode. Dev-mode stores start empty on every
    /// run, so an account from an earlier run can never be found.
    pub fn require_persistent_stores(&self, command: &str) -> Result<()> {
        if self.dev_mode {
            return Err(TallyError::Config(format!(
                "'{command}' needs an account from an earlier run, but dev mode keeps \
                 nothing between runs; use MongoDB (without --dev-mode)"
            )));
        }
        Ok(())
    }

    /// Build the token service. Dev mode falls back to a built-in secret
    /// when none is configured.
    pub fn token_service(&self) -> Result<TokenService> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => TokenService::new(secret, self.token_expiry),
            (None, true) => Ok(TokenService::new_dev(self.token_expiry)),
            (None, false) => Err(TallyError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }
}
