//! Configuration types.
//!
//! `AppConfig` is loaded once before a run and never reloaded. The mailbox
//! session and the classifier each receive the parts they need.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_FOLDER: &str = "inbox";
pub const DEFAULT_SINCE_DAYS: u32 = 7;
pub const DEFAULT_MAX_MESSAGES: usize = 30;
pub const DEFAULT_LLM_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "mistralai/mistral-7b-instruct";

/// Mailbox connection and retrieval settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub address: String,
    /// App password. Whitespace is stripped at login time.
    pub password: SecretString,
    pub folder: String,
    pub since_days: u32,
    pub max_messages: usize,
    /// Applies to TCP connect and to every socket read/write.
    pub timeout: Duration,
}

/// Remote classification service settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Whole-run configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mail: MailConfig,
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Every missing required key is reported in one error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let address = get("EMAIL");
        let password = get("EMAIL_PASSWORD");
        let api_key = get("OPENROUTER_API_KEY");

        let missing: Vec<&str> = [
            ("EMAIL", address.is_none()),
            ("EMAIL_PASSWORD", password.is_none()),
            ("OPENROUTER_API_KEY", api_key.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        let (Some(address), Some(password), Some(api_key)) = (address, password, api_key) else {
            return Err(ConfigError::MissingEnvVar(missing.join(", ")));
        };

        let mail = MailConfig {
            imap_host: get("IMAP_SERVER").unwrap_or_else(|| DEFAULT_IMAP_HOST.to_string()),
            imap_port: parse_or("IMAP_PORT", get("IMAP_PORT"), DEFAULT_IMAP_PORT)?,
            address: address.trim().to_string(),
            password: SecretString::from(password),
            folder: get("MAIL_FOLDER").unwrap_or_else(|| DEFAULT_FOLDER.to_string()),
            since_days: parse_or("FETCH_SINCE_DAYS", get("FETCH_SINCE_DAYS"), DEFAULT_SINCE_DAYS)?,
            max_messages: parse_or(
                "FETCH_MAX_MESSAGES",
                get("FETCH_MAX_MESSAGES"),
                DEFAULT_MAX_MESSAGES,
            )?,
            timeout: Duration::from_secs(30),
        };

        let classifier = ClassifierConfig {
            endpoint: get("OPENROUTER_URL").unwrap_or_else(|| DEFAULT_LLM_URL.to_string()),
            api_key: SecretString::from(api_key),
            model: get("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            max_tokens: 800,
            temperature: 0.1,
            timeout: Duration::from_secs(60),
        };

        Ok(Self { mail, classifier })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
