pub mod engine;

use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::DatabaseConnection;

use crate::email::extractor::{self, ExtractedFields};
use crate::email::normalizer::{self, NormalizedBatch};
use crate::email::session::MailSession;
use crate::error::{AppError, AppResult};
use crate::model::transaction::TransactionCtrl;
use crate::server_config::{cfg, MailboxConfig};
use engine::ApplyResult;

/// Counts describing one pipeline run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
    pub messages_fetched: usize,
    pub messages_skipped: usize,
    pub blocks_extracted: usize,
    pub records_normalized: usize,
    pub validation_failures: usize,
    pub apply: ApplyResult,
}

/// Output of the blocking mailbox walk: extracted entries plus fetch stats.
#[derive(Debug, Default)]
struct MailboxBatch {
    entries: Vec<ExtractedFields>,
    messages_fetched: usize,
    messages_skipped: usize,
}

/// Where incremental searches start when the store is empty.
fn incremental_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Truncates both tables, then rebuilds them from every matching message in
/// the mailbox.
pub async fn run_full_refresh(conn: &DatabaseConnection) -> AppResult<IngestSummary> {
    tracing::info!("starting full refresh");
    TransactionCtrl::truncate_all(conn).await?;

    let batch = fetch_mailbox_batch(None).await?;
    let summary = ingest_batch(conn, batch).await?;
    tracing::info!(
        inserted = summary.apply.transactions_inserted,
        receivers_created = summary.apply.receivers_created,
        "full refresh finished"
    );

    Ok(summary)
}

/// Ingests messages dated on or after the latest stored transaction, at day
/// granularity. `None` means nothing new turned up.
pub async fn run_incremental(conn: &DatabaseConnection) -> AppResult<Option<IngestSummary>> {
    let since = TransactionCtrl::latest_transaction_date(conn)
        .await?
        .unwrap_or_else(incremental_epoch)
        .date();
    tracing::info!(%since, "searching for new messages");

    let batch = fetch_mailbox_batch(Some(since)).await?;
    let summary = ingest_batch(conn, batch).await?;
    if summary.records_normalized == 0 {
        tracing::info!("no new transactions found");
        return Ok(None);
    }
    tracing::info!(
        inserted = summary.apply.transactions_inserted,
        skipped = summary.apply.transactions_skipped,
        "incremental run finished"
    );

    Ok(Some(summary))
}

/// Normalizes the extracted entries and applies them to storage.
async fn ingest_batch(
    conn: &DatabaseConnection,
    batch: MailboxBatch,
) -> AppResult<IngestSummary> {
    let MailboxBatch {
        entries,
        messages_fetched,
        messages_skipped,
    } = batch;
    let blocks_extracted = entries.len();

    let NormalizedBatch { records, failures } = normalizer::normalize(entries);
    let records_normalized = records.len();
    let validation_failures = failures.len();
    if validation_failures > 0 {
        tracing::warn!(
            count = validation_failures,
            "extracted rows failed validation"
        );
    }

    let apply = engine::apply(conn, records).await?;

    Ok(IngestSummary {
        messages_fetched,
        messages_skipped,
        blocks_extracted,
        records_normalized,
        validation_failures,
        apply,
    })
}

/// Runs the blocking mailbox walk on a dedicated thread so it cannot stall
/// the async executor. A full mailbox walk can take minutes.
async fn fetch_mailbox_batch(since: Option<NaiveDate>) -> AppResult<MailboxBatch> {
    let mailbox = cfg.mailbox.clone();
    let batch = tokio::task::spawn_blocking(move || collect_mailbox_batch(&mailbox, since))
        .await
        .map_err(|err| AppError::Internal(err.into()))??;

    Ok(batch)
}

fn collect_mailbox_batch(
    config: &MailboxConfig,
    since: Option<NaiveDate>,
) -> AppResult<MailboxBatch> {
    let mut session = MailSession::open(config)?;
    let ids = session.search_from(&config.sender_filter, since)?;
    tracing::info!(messages = ids.len(), "mailbox search finished");

    let mut batch = MailboxBatch::default();
    for id in ids {
        match session.fetch(id) {
            Ok(raw) => {
                batch.messages_fetched += 1;
                batch.entries.extend(extractor::extract(&raw));
            }
            Err(err) => {
                batch.messages_skipped += 1;
                tracing::warn!(seq = id, "failed to fetch message, skipping: {:?}", err);
            }
        }
    }
    session.logout();

    Ok(batch)
}
