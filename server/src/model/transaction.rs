use chrono::NaiveDateTime;
use sea_orm::sea_query::Expr;

use crate::db_core::prelude::*;
use crate::error::AppResult;

pub struct TransactionCtrl;

#[derive(Debug, FromQueryResult)]
struct MaxTransactionDate {
    max_date: Option<NaiveDateTime>,
}

impl TransactionCtrl {
    /// Everything stored, newest first.
    pub async fn all(conn: &DatabaseConnection) -> AppResult<Vec<transactions::Model>> {
        let rows = Transactions::find()
            .order_by_desc(transactions::Column::TransactionDate)
            .all(conn)
            .await?;

        Ok(rows)
    }

    /// Timestamp of the most recent stored transaction, if any.
    pub async fn latest_transaction_date(
        conn: &DatabaseConnection,
    ) -> AppResult<Option<NaiveDateTime>> {
        let row = Transactions::find()
            .select_only()
            .column_as(
                Expr::col(transactions::Column::TransactionDate).max(),
                "max_date",
            )
            .into_model::<MaxTransactionDate>()
            .one(conn)
            .await?;

        Ok(row.and_then(|r| r.max_date))
    }

    /// Bulk insert keyed on `upi_ref_no`. Rows whose reference number is
    /// already stored are left untouched. Returns how many rows actually
    /// went in.
    pub async fn insert_new<C: ConnectionTrait>(
        conn: &C,
        models: Vec<transactions::ActiveModel>,
    ) -> AppResult<u64> {
        let inserted = Transactions::insert_many(models)
            .on_conflict(
                OnConflict::column(transactions::Column::UpiRefNo)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        Ok(inserted)
    }

    /// Destructive reset of both tables, identities included.
    pub async fn truncate_all(conn: &DatabaseConnection) -> AppResult<()> {
        conn.execute_unprepared(
            "TRUNCATE TABLE transactions, receiver RESTART IDENTITY CASCADE",
        )
        .await?;

        Ok(())
    }
}
