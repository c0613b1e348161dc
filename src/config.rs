//! Configuration management

use crate::dispatch::TwilioConfig;
use crate::webhook::DEFAULT_WELCOME;
use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,

    /// SQLite database path
    pub db_path: PathBuf,

    /// Twilio credentials and WhatsApp number
    pub twilio: TwilioConfig,

    /// Stripe secret key (billing disabled when unset)
    pub stripe_secret_key: Option<String>,

    /// Base URL of the hosted auth backend (billing disabled when unset)
    pub auth_url: Option<String>,

    /// Welcome notice for unregistered numbers
    pub welcome_message: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("GENIA_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()?;

        let db_path = std::env::var("GENIA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("genia")
                    .join("gateway.db")
            });

        let twilio = TwilioConfig {
            account_sid: std::env::var("TWILIO_ACCOUNT_SID")
                .map_err(|_| anyhow::anyhow!("TWILIO_ACCOUNT_SID not set"))?,
            auth_token: std::env::var("TWILIO_AUTH_TOKEN")
                .map_err(|_| anyhow::anyhow!("TWILIO_AUTH_TOKEN not set"))?,
            whatsapp_number: std::env::var("TWILIO_WHATSAPP_NUMBER")
                .map_err(|_| anyhow::anyhow!("TWILIO_WHATSAPP_NUMBER not set"))?,
        };

        let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY").ok();
        let auth_url = std::env::var("GENIA_AUTH_URL").ok();

        let welcome_message =
            std::env::var("GENIA_WELCOME_MESSAGE").unwrap_or_else(|_| DEFAULT_WELCOME.to_string());

        Ok(Self {
            bind_addr,
            db_path,
            twilio,
            stripe_secret_key,
            auth_url,
            welcome_message,
        })
    }

    /// Configuration with dummy credentials for tests
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            db_path: PathBuf::from(":memory:"),
            twilio: TwilioConfig {
                account_sid: "ACtest".to_string(),
                auth_token: "token".to_string(),
                whatsapp_number: "+14155238886".to_string(),
            },
            stripe_secret_key: None,
            auth_url: None,
            welcome_message: DEFAULT_WELCOME.to_string(),
        }
    }
}

// Platform-specific dirs fallback
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .ok()
                .or_else(|| {
                    std::env::var("HOME")
                        .map(|h| PathBuf::from(h).join(".local/share"))
                        .ok()
                })
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
                .ok()
        }

        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").map(PathBuf::from).ok()
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            None
        }
    }
}
