use std::sync::Arc;

use axum::{extract::State, Json};

use crate::db_core::prelude::*;
use crate::error::{self, AppError, AppJsonResult, AppResult};
use crate::ingest::{self, IngestSummary};
use crate::model::{response::StatusResponse, transaction::TransactionCtrl};

/// Plain listing of everything stored, newest first.
pub async fn get_transactions(
    State(conn): State<Arc<DatabaseConnection>>,
) -> AppJsonResult<Vec<transactions::Model>> {
    let rows = TransactionCtrl::all(&conn).await?;

    Ok(Json(rows))
}

/// Truncates both tables and rebuilds them from the whole mailbox. Rare and
/// expensive; a large mailbox takes minutes to walk.
pub async fn full_refresh_transactions(
    State(conn): State<Arc<DatabaseConnection>>,
) -> AppJsonResult<StatusResponse> {
    match ingest::run_full_refresh(&conn).await {
        Ok(summary) => {
            tracing::info!(?summary, "full refresh completed");
            Ok(Json(StatusResponse::ok(
                "Full refresh completed successfully",
            )))
        }
        Err(err) => connection_failure_response(err),
    }
}

/// Ingests messages newer than the latest stored transaction date.
pub async fn new_transactions(
    State(conn): State<Arc<DatabaseConnection>>,
) -> AppJsonResult<StatusResponse> {
    incremental_response(ingest::run_incremental(&conn).await)
}

/// Maps an incremental outcome to its fixed status payload.
fn incremental_response(
    outcome: AppResult<Option<IngestSummary>>,
) -> AppJsonResult<StatusResponse> {
    match outcome {
        Ok(None) => Ok(Json(StatusResponse::ok("No new transactions found."))),
        Ok(Some(summary)) => {
            tracing::info!(?summary, "incremental run completed");
            Ok(Json(StatusResponse::ok(
                "Incremental transactions processed successfully",
            )))
        }
        Err(err) => connection_failure_response(err),
    }
}

/// Lost connections answer with the structured retryable payload; anything
/// else propagates as a server fault.
fn connection_failure_response(err: AppError) -> AppJsonResult<StatusResponse> {
    match err {
        AppError::MailboxConnection(msg) => {
            tracing::error!("mailbox unreachable: {}", msg);
            Ok(Json(StatusResponse::error(
                "Mailbox connection lost. Please retry.",
            )))
        }
        AppError::DbError(ref db_err) if error::is_connection_err(db_err) => {
            tracing::error!("database unreachable: {:?}", db_err);
            Ok(Json(StatusResponse::error(
                "Database connection lost. Please retry.",
            )))
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_none_reports_no_new_transactions() {
        let Json(response) = incremental_response(Ok(None)).unwrap();

        assert_eq!(response.status, "ok");
        assert_eq!(response.message, "No new transactions found.");
    }

    #[test]
    fn test_incremental_summary_reports_success() {
        let Json(response) = incremental_response(Ok(Some(IngestSummary::default()))).unwrap();

        assert_eq!(response.status, "ok");
        assert_eq!(
            response.message,
            "Incremental transactions processed successfully"
        );
    }

    #[test]
    fn test_mailbox_connection_lost_response() {
        let err = AppError::MailboxConnection("connection reset".to_string());

        let Json(response) = connection_failure_response(err).unwrap();

        assert_eq!(response.status, "error");
        assert_eq!(response.message, "Mailbox connection lost. Please retry.");
    }

    #[test]
    fn test_db_connection_lost_response() {
        let err = AppError::DbError(DbErr::Conn(sea_orm::RuntimeErr::Internal(
            "pool timed out".to_string(),
        )));

        let Json(response) = connection_failure_response(err).unwrap();

        assert_eq!(response.status, "error");
        assert_eq!(response.message, "Database connection lost. Please retry.");
    }

    #[test]
    fn test_other_errors_propagate() {
        let err = AppError::DbError(DbErr::Custom("constraint violated".to_string()));

        assert!(connection_failure_response(err).is_err());
    }
}
