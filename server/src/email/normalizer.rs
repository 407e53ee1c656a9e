use chrono::NaiveDateTime;
use derive_more::derive::Display;
use sea_orm::prelude::Decimal;

use super::extractor::{ExtractedFields, FieldLabel};

/// Format the bank stamps on `Transaction Date` lines.
pub const DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// One fully-typed transaction, ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub upi_ref_no: String,
    pub amount: Decimal,
    pub sender_upi: String,
    pub receiver_upi: String,
    pub receiver_name: String,
    pub transaction_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RecordError {
    #[display("missing field {_0}")]
    MissingField(FieldLabel),
    #[display("unparseable amount {_0:?}")]
    BadAmount(String),
    #[display("negative amount {_0}")]
    NegativeAmount(String),
    #[display("unparseable transaction date {_0:?}")]
    BadDate(String),
}

/// Row-level rejection: the entry at `index` in extraction order, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub index: usize,
    pub error: RecordError,
}

/// Typed records plus the rows that failed coercion. The two sides together
/// account for every input entry.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<TransactionRecord>,
    pub failures: Vec<ValidationFailure>,
}

/// Coerces extracted entries into typed records, collecting per-row failures
/// rather than dropping rows silently. Order is preserved and duplicate
/// reference numbers pass through untouched; the upsert engine keeps the
/// first of each.
pub fn normalize(entries: Vec<ExtractedFields>) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for (index, fields) in entries.iter().enumerate() {
        match normalize_entry(fields) {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                tracing::warn!(index, %error, "rejecting extracted row");
                batch.failures.push(ValidationFailure { index, error });
            }
        }
    }

    batch
}

fn normalize_entry(fields: &ExtractedFields) -> Result<TransactionRecord, RecordError> {
    Ok(TransactionRecord {
        upi_ref_no: required(fields, FieldLabel::UpiRefNo)?.to_string(),
        amount: parse_amount(required(fields, FieldLabel::Amount)?)?,
        sender_upi: required(fields, FieldLabel::FromVpa)?.to_string(),
        receiver_upi: required(fields, FieldLabel::ToVpa)?.to_string(),
        receiver_name: required(fields, FieldLabel::PayeeName)?.to_string(),
        transaction_date: parse_date(required(fields, FieldLabel::TransactionDate)?)?,
    })
}

fn required(fields: &ExtractedFields, label: FieldLabel) -> Result<&str, RecordError> {
    fields
        .get(label)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(RecordError::MissingField(label))
}

fn parse_amount(value: &str) -> Result<Decimal, RecordError> {
    let amount = value
        .parse::<Decimal>()
        .map_err(|_| RecordError::BadAmount(value.to_string()))?;
    if amount.is_sign_negative() {
        return Err(RecordError::NegativeAmount(value.to_string()));
    }

    Ok(amount)
}

fn parse_date(value: &str) -> Result<NaiveDateTime, RecordError> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| RecordError::BadDate(value.to_string()))
}
