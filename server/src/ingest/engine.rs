use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::db_core::prelude::*;
use crate::email::normalizer::TransactionRecord;
use crate::error::AppResult;
use crate::model::{receiver::ReceiverCtrl, transaction::TransactionCtrl};

/// Every stored row carries this payment mode.
const PAYMENT_MODE_UPI: &str = "UPI";

/// What one batch application did to storage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyResult {
    pub transactions_inserted: u64,
    pub transactions_skipped: u64,
    pub receivers_created: u64,
    pub receivers_updated: u64,
    pub unmatched_receivers: u64,
}

/// Applies one normalized batch atomically: receiver upsert, identity
/// read-back, then insert-or-ignore of the transaction rows. Either every
/// write in the batch commits or none do. An empty batch returns without
/// touching storage.
pub async fn apply(
    conn: &DatabaseConnection,
    records: Vec<TransactionRecord>,
) -> AppResult<ApplyResult> {
    if records.is_empty() {
        return Ok(ApplyResult::default());
    }

    let txn = conn.begin().await?;
    let result = apply_within(&txn, records).await?;
    txn.commit().await?;

    Ok(result)
}

/// The engine steps against one connection-like handle. Split from
/// [`apply`] so tests can drive it without a surrounding transaction.
async fn apply_within<C: ConnectionTrait>(
    conn: &C,
    records: Vec<TransactionRecord>,
) -> AppResult<ApplyResult> {
    let authoritative = authoritative_receiver_names(&records);
    let upis: Vec<String> = authoritative.iter().map(|(upi, _)| upi.clone()).collect();

    let existing = ReceiverCtrl::existing_upis(conn, &upis).await?;
    let receivers_updated = existing.len() as u64;
    let receivers_created = upis.len() as u64 - receivers_updated;

    ReceiverCtrl::upsert_names(conn, &authoritative).await?;
    let receiver_ids = ReceiverCtrl::ids_by_upi(conn, &upis).await?;

    let deduped = dedupe_by_ref(records);
    let batch_size = deduped.len() as u64;

    let mut unmatched_receivers = 0u64;
    let models: Vec<transactions::ActiveModel> = deduped
        .into_iter()
        .map(|record| {
            let receiver_id = receiver_ids.get(&record.receiver_upi).copied();
            if receiver_id.is_none() {
                unmatched_receivers += 1;
                tracing::warn!(
                    upi_ref_no = %record.upi_ref_no,
                    receiver_upi = %record.receiver_upi,
                    "no receiver row for transaction, storing without one"
                );
            }
            build_active_model(record, receiver_id)
        })
        .collect();

    let transactions_inserted = TransactionCtrl::insert_new(conn, models).await?;

    Ok(ApplyResult {
        transactions_inserted,
        transactions_skipped: batch_size - transactions_inserted,
        receivers_created,
        receivers_updated,
        unmatched_receivers,
    })
}

fn build_active_model(
    record: TransactionRecord,
    receiver_id: Option<i32>,
) -> transactions::ActiveModel {
    transactions::ActiveModel {
        transaction_id: ActiveValue::NotSet,
        upi_ref_no: ActiveValue::Set(record.upi_ref_no),
        amount: ActiveValue::Set(record.amount),
        sender_upi: ActiveValue::Set(record.sender_upi),
        receiver_id: ActiveValue::Set(receiver_id),
        transaction_date: ActiveValue::Set(record.transaction_date),
        payment_mode: ActiveValue::Set(PAYMENT_MODE_UPI.to_string()),
        category_id: ActiveValue::Set(None),
        is_category_overwritten: ActiveValue::Set(false),
    }
}

/// One `(receiver_upi, receiver_name)` pair per handle, in first-seen order.
/// The name comes from the latest-dated record in the batch; on a tie the
/// earlier record keeps it.
fn authoritative_receiver_names(records: &[TransactionRecord]) -> Vec<(String, String)> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut latest: HashMap<String, (usize, NaiveDateTime)> = HashMap::new();

    for record in records {
        match latest.get(&record.receiver_upi) {
            None => {
                latest.insert(
                    record.receiver_upi.clone(),
                    (order.len(), record.transaction_date),
                );
                order.push((record.receiver_upi.clone(), record.receiver_name.clone()));
            }
            Some(&(position, seen_date)) if record.transaction_date > seen_date => {
                latest.insert(
                    record.receiver_upi.clone(),
                    (position, record.transaction_date),
                );
                order[position].1 = record.receiver_name.clone();
            }
            Some(_) => {}
        }
    }

    order
}

/// First occurrence wins inside a batch: repeated reference numbers after
/// the first are dropped before the insert.
fn dedupe_by_ref(records: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.upi_ref_no.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sea_orm::prelude::Decimal;

    use super::*;

    fn record(
        ref_no: &str,
        receiver_upi: &str,
        name: &str,
        day: u32,
        hour: u32,
    ) -> TransactionRecord {
        TransactionRecord {
            upi_ref_no: ref_no.to_string(),
            amount: Decimal::new(10000, 2),
            sender_upi: "alice@okbank".to_string(),
            receiver_upi: receiver_upi.to_string(),
            receiver_name: name.to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_latest_name_wins() {
        let records = vec![
            record("1", "shop@upi", "Old Shop Name", 1, 9),
            record("2", "cafe@upi", "Cafe", 2, 9),
            record("3", "shop@upi", "New Shop Name", 5, 9),
        ];

        let pairs = authoritative_receiver_names(&records);

        assert_eq!(
            pairs,
            vec![
                ("shop@upi".to_string(), "New Shop Name".to_string()),
                ("cafe@upi".to_string(), "Cafe".to_string()),
            ]
        );
    }

    #[test]
    fn test_equal_dates_keep_first_name() {
        let records = vec![
            record("1", "shop@upi", "First Name", 3, 9),
            record("2", "shop@upi", "Second Name", 3, 9),
        ];

        let pairs = authoritative_receiver_names(&records);

        assert_eq!(
            pairs,
            vec![("shop@upi".to_string(), "First Name".to_string())]
        );
    }

    #[test]
    fn test_stale_record_does_not_rename() {
        let records = vec![
            record("1", "shop@upi", "Current", 6, 9),
            record("2", "shop@upi", "Stale", 2, 9),
        ];

        let pairs = authoritative_receiver_names(&records);

        assert_eq!(pairs, vec![("shop@upi".to_string(), "Current".to_string())]);
    }

    #[test]
    fn test_dedupe_keeps_first_row() {
        let records = vec![
            record("77", "shop@upi", "Shop", 1, 9),
            record("77", "shop@upi", "Shop Again", 2, 9),
            record("78", "cafe@upi", "Cafe", 1, 9),
        ];

        let deduped = dedupe_by_ref(records);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].upi_ref_no, "77");
        assert_eq!(deduped[0].receiver_name, "Shop");
        assert_eq!(deduped[1].upi_ref_no, "78");
    }

    fn receiver_row(id: i32, upi: &str, name: &str) -> receiver::Model {
        receiver::Model {
            receiver_id: id,
            receiver_upi: upi.to_string(),
            receiver_name: name.to_string(),
            category_id: 0,
        }
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_apply_counts() {
        use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![receiver_row(1, "shop@upi", "Old Shop Name")],
                vec![
                    receiver_row(1, "shop@upi", "New Shop Name"),
                    receiver_row(2, "cafe@upi", "Cafe"),
                ],
            ])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            .into_connection();

        let records = vec![
            record("1", "shop@upi", "New Shop Name", 5, 9),
            record("2", "cafe@upi", "Cafe", 2, 9),
        ];

        let result = apply_within(&conn, records).await.unwrap();

        assert_eq!(result.receivers_created, 1);
        assert_eq!(result.receivers_updated, 1);
        assert_eq!(result.transactions_inserted, 2);
        assert_eq!(result.transactions_skipped, 0);
        assert_eq!(result.unmatched_receivers, 0);
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_replay_inserts_nothing() {
        use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![
                    receiver_row(1, "shop@upi", "Shop"),
                    receiver_row(2, "cafe@upi", "Cafe"),
                ],
                vec![
                    receiver_row(1, "shop@upi", "Shop"),
                    receiver_row(2, "cafe@upi", "Cafe"),
                ],
            ])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        let records = vec![
            record("1", "shop@upi", "Shop", 1, 9),
            record("2", "cafe@upi", "Cafe", 2, 9),
        ];

        let result = apply_within(&conn, records).await.unwrap();

        assert_eq!(result.transactions_inserted, 0);
        assert_eq!(result.transactions_skipped, 2);
        assert_eq!(result.receivers_created, 0);
        assert_eq!(result.receivers_updated, 2);
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_unmatched_receiver_still_inserted() {
        use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                Vec::<receiver::Model>::new(),
                vec![receiver_row(1, "shop@upi", "Shop")],
            ])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            .into_connection();

        let records = vec![
            record("1", "shop@upi", "Shop", 1, 9),
            record("2", "cafe@upi", "Cafe", 2, 9),
        ];

        let result = apply_within(&conn, records).await.unwrap();

        assert_eq!(result.transactions_inserted, 2);
        assert_eq!(result.unmatched_receivers, 1);
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        use sea_orm::{DatabaseBackend, MockDatabase};

        // No queued results: any statement would make the mock panic.
        let conn = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let result = apply(&conn, Vec::new()).await.unwrap();

        assert_eq!(result, ApplyResult::default());
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_apply_end_to_end() {
        let conn = crate::testing::common::setup().await;
        crate::testing::common::ensure_schema(&conn).await;
        TransactionCtrl::truncate_all(&conn).await.unwrap();

        let batch = vec![
            record("9001", "shop@upi", "Shop", 1, 9),
            record("9002", "shop@upi", "Shop Renamed", 5, 9),
            record("9003", "cafe@upi", "Cafe", 2, 9),
        ];

        let first = apply(&conn, batch.clone()).await.unwrap();
        assert_eq!(first.transactions_inserted, 3);
        assert_eq!(first.receivers_created, 2);
        assert_eq!(first.receivers_updated, 0);

        let shop = Receiver::find()
            .filter(receiver::Column::ReceiverUpi.eq("shop@upi"))
            .one(&conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shop.receiver_name, "Shop Renamed");

        let second = apply(&conn, batch).await.unwrap();
        assert_eq!(second.transactions_inserted, 0);
        assert_eq!(second.transactions_skipped, 3);
        assert_eq!(second.receivers_created, 0);
        assert_eq!(second.receivers_updated, 2);

        let mut changed = record("9001", "shop@upi", "Shop", 1, 9);
        changed.amount = Decimal::new(99900, 2);
        let third = apply(&conn, vec![changed]).await.unwrap();
        assert_eq!(third.transactions_inserted, 0);

        let stored = Transactions::find()
            .filter(transactions::Column::UpiRefNo.eq("9001"))
            .one(&conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.amount, Decimal::new(10000, 2));
    }
}
