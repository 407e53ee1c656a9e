use std::net::TcpStream;

use anyhow::Context;
use chrono::NaiveDate;
use native_tls::{TlsConnector, TlsStream};

use crate::error::{AppError, AppResult};
use crate::server_config::MailboxConfig;

const INBOX: &str = "INBOX";

/// One fetched message: its sequence number and undecoded RFC822 content.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub seq: u32,
    pub content: Vec<u8>,
}

/// An authenticated IMAP session. The mailbox is opened read-only, so a
/// pipeline run never changes message flags.
pub struct MailSession {
    session: imap::Session<TlsStream<TcpStream>>,
}

impl MailSession {
    pub fn open(config: &MailboxConfig) -> AppResult<Self> {
        let tls = TlsConnector::builder()
            .build()
            .map_err(|err| AppError::MailboxConnection(err.to_string()))?;
        let client = imap::connect(
            (config.imap_host.as_str(), config.imap_port),
            config.imap_host.as_str(),
            &tls,
        )?;
        let mut session = client
            .login(&config.imap_username, &config.imap_password)
            .map_err(|(err, _client)| err)?;
        session.examine(INBOX)?;

        Ok(MailSession { session })
    }

    /// Sequence numbers of every message from `sender`, oldest first,
    /// optionally restricted to messages dated on or after `since`.
    pub fn search_from(
        &mut self,
        sender: &str,
        since: Option<NaiveDate>,
    ) -> AppResult<Vec<u32>> {
        let query = search_query(sender, since);
        let mut ids: Vec<u32> = self.session.search(&query)?.into_iter().collect();
        ids.sort_unstable();

        Ok(ids)
    }

    /// Full content of one message. A failure here loses only this message,
    /// not the batch; expunged sequence numbers turn up empty.
    pub fn fetch(&mut self, seq: u32) -> anyhow::Result<RawMessage> {
        let fetches = self.session.fetch(seq.to_string(), "RFC822")?;
        let content = fetches
            .iter()
            .next()
            .and_then(|fetch| fetch.body())
            .with_context(|| format!("message {seq} is gone from the mailbox"))?
            .to_vec();

        Ok(RawMessage { seq, content })
    }

    pub fn logout(mut self) {
        if let Err(err) = self.session.logout() {
            tracing::debug!("IMAP logout failed: {:?}", err);
        }
    }
}

/// SEARCH criteria for the sender filter, with an optional SINCE clause.
pub(crate) fn search_query(sender: &str, since: Option<NaiveDate>) -> String {
    match since {
        Some(date) => format!("FROM \"{}\" SINCE {}", sender, imap_since(date)),
        None => format!("FROM \"{}\"", sender),
    }
}

/// SEARCH dates are day-granular `DD-MMM-YYYY`, uppercased.
pub(crate) fn imap_since(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string().to_uppercase()
}
