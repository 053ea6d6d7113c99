//! Environment-driven settings.
//!
//! Everything is optional at load time; components that need a value ask for
//! it through the `require_*` accessors, which fail with [`Error::Config`]
//! naming the missing variable.

use crate::{Error, Result};

pub const DEFAULT_STORAGE_URL: &str = "sqlite://finwatch.db";
pub const DEFAULT_GOOGLE_REGION: &str = "us-central1";
pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Clone, Default)]
pub struct Settings {
    pub storage_url: String,
    pub google_api_key: Option<String>,
    pub google_project_id: Option<String>,
    pub google_region: String,
    pub google_access_token: Option<String>,
    pub finnhub_api_key: Option<String>,
    pub tushare_token: Option<String>,
    pub gmail_username: Option<String>,
    pub gmail_app_password: Option<String>,
    pub receiver_email: Option<String>,
    pub smtp_server: String,
    pub smtp_port: u16,
}

#[derive(Clone)]
pub struct EmailSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender: String,
    pub password: String,
    pub receiver: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let smtp_port = match get("SMTP_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("SMTP_PORT is not a valid port: {}", raw)))?,
            None => DEFAULT_SMTP_PORT,
        };

        Ok(Self {
            storage_url: get("STORAGE_URL").unwrap_or_else(|| DEFAULT_STORAGE_URL.to_string()),
            google_api_key: get("GOOGLE_API_KEY"),
            google_project_id: get("GOOGLE_PROJECT_ID"),
            google_region: get("GOOGLE_REGION").unwrap_or_else(|| DEFAULT_GOOGLE_REGION.to_string()),
            google_access_token: get("GOOGLE_ACCESS_TOKEN"),
            finnhub_api_key: get("FINNHUB_API_KEY"),
            tushare_token: get("TUSHARE_TOKEN").or_else(|| get("TUSHARE_API_TOKEN")),
            gmail_username: get("GMAIL_USERNAME"),
            gmail_app_password: get("GMAIL_APP_PASSWORD"),
            receiver_email: get("RECEIVER_EMAIL"),
            smtp_server: get("SMTP_SERVER").unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
            smtp_port,
        })
    }

    pub fn require_finnhub_key(&self) -> Result<&str> {
        require(self.finnhub_api_key.as_deref(), "FINNHUB_API_KEY")
    }

    pub fn require_tushare_token(&self) -> Result<&str> {
        require(self.tushare_token.as_deref(), "TUSHARE_TOKEN")
    }

    pub fn email(&self) -> Result<EmailSettings> {
        Ok(EmailSettings {
            smtp_server: self.smtp_server.clone(),
            smtp_port: self.smtp_port,
            sender: require(self.gmail_username.as_deref(), "GMAIL_USERNAME")?.to_string(),
            password: require(self.gmail_app_password.as_deref(), "GMAIL_APP_PASSWORD")?.to_string(),
            receiver: require(self.receiver_email.as_deref(), "RECEIVER_EMAIL")?.to_string(),
        })
    }
}

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value.ok_or_else(|| Error::Config(format!("{} is not set", name)))
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Settings")
            .field("storage_url", &self.storage_url)
            .field("google_api_key", &redact(&self.google_api_key))
            .field("google_project_id", &self.google_project_id)
            .field("google_region", &self.google_region)
            .field("google_access_token", &redact(&self.google_access_token))
            .field("finnhub_api_key", &redact(&self.finnhub_api_key))
            .field("tushare_token", &redact(&self.tushare_token))
            .field("gmail_username", &self.gmail_username)
            .field("gmail_app_password", &redact(&self.gmail_app_password))
            .field("receiver_email", &self.receiver_email)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .finish()
    }
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("sender", &self.sender)
            .field("password", &"<redacted>")
            .field("receiver", &self.receiver)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.storage_url, DEFAULT_STORAGE_URL);
        assert_eq!(s.google_region, DEFAULT_GOOGLE_REGION);
        assert_eq!(s.smtp_port, 587);
        assert!(s.google_api_key.is_none());
    }

    #[test]
    fn test_blank_values_are_missing() {
        let s = settings(&[("GOOGLE_API_KEY", "   ")]).unwrap();
        assert!(s.google_api_key.is_none());
    }

    #[test]
    fn test_invalid_port() {
        assert!(settings(&[("SMTP_PORT", "abc")]).is_err());
    }

    #[test]
    fn test_email_requires_all_credentials() {
        let s = settings(&[("GMAIL_USERNAME", "a@b.c"), ("GMAIL_APP_PASSWORD", "pw")]).unwrap();
        let err = s.email().unwrap_err();
        assert!(err.to_string().contains("RECEIVER_EMAIL"));

        let s = settings(&[
            ("GMAIL_USERNAME", "a@b.c"),
            ("GMAIL_APP_PASSWORD", "pw"),
            ("RECEIVER_EMAIL", "d@e.f"),
        ])
        .unwrap();
        let email = s.email().unwrap();
        assert_eq!(email.receiver, "d@e.f");
        assert!(!format!("{:?}", email).contains("pw"));
    }

    #[test]
    fn test_finnhub_key_required() {
        let s = settings(&[]).unwrap();
        assert!(s.require_finnhub_key().is_err());
        let s = settings(&[("FINNHUB_API_KEY", "k")]).unwrap();
        assert_eq!(s.require_finnhub_key().unwrap(), "k");
    }

    #[test]
    fn test_tushare_token() {
        let s = settings(&[]).unwrap();
        assert!(s.require_tushare_token().unwrap_err().to_string().contains("TUSHARE_TOKEN"));

        let s = settings(&[("TUSHARE_API_TOKEN", "legacy")]).unwrap();
        assert_eq!(s.require_tushare_token().unwrap(), "legacy");

        let s = settings(&[("TUSHARE_API_TOKEN", "legacy"), ("TUSHARE_TOKEN", "t0k")]).unwrap();
        assert_eq!(s.require_tushare_token().unwrap(), "t0k");
        assert!(!format!("{:?}", s).contains("t0k"));
    }
}
