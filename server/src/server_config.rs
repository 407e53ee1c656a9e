use config::{Config, ConfigError};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::result::Result;

fn default_imap_host() -> String {
    "imap.gmail.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

/// Mailbox settings, read from the environment at process start:
/// `IMAP_HOST`, `IMAP_PORT`, `IMAP_USERNAME`, `IMAP_PASSWORD` and
/// `SENDER_FILTER` (the bank address whose alerts get ingested).
#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_imap_host")]
    pub imap_host: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    pub imap_username: String,
    pub imap_password: String,
    pub sender_filter: String,
}

impl MailboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        builder.try_deserialize()
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    pub mailbox: MailboxConfig,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\nMailbox: {}:{} as {}\nSender filter: {}",
            self.mailbox.imap_host,
            self.mailbox.imap_port,
            self.mailbox.imap_username,
            self.mailbox.sender_filter,
        )
    }
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let mailbox = MailboxConfig::from_env()
            .expect("IMAP_USERNAME, IMAP_PASSWORD and SENDER_FILTER must be set");

        ServerConfig { mailbox }
    };
}
