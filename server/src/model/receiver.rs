use std::collections::{HashMap, HashSet};

use crate::db_core::prelude::*;
use crate::error::AppResult;

/// Receivers start out uncategorized.
const DEFAULT_CATEGORY_ID: i32 = 0;

pub struct ReceiverCtrl;

impl ReceiverCtrl {
    /// Which of `upis` already have a receiver row.
    pub async fn existing_upis<C: ConnectionTrait>(
        conn: &C,
        upis: &[String],
    ) -> AppResult<HashSet<String>> {
        let existing = Receiver::find()
            .filter(receiver::Column::ReceiverUpi.is_in(upis.iter().cloned()))
            .all(conn)
            .await?
            .into_iter()
            .map(|model| model.receiver_upi)
            .collect();

        Ok(existing)
    }

    /// Inserts every `(receiver_upi, receiver_name)` pair, overwriting the
    /// stored name when the handle already exists. Callers pass at most one
    /// pair per handle.
    pub async fn upsert_names<C: ConnectionTrait>(
        conn: &C,
        pairs: &[(String, String)],
    ) -> AppResult<()> {
        let models = pairs.iter().map(|(upi, name)| receiver::ActiveModel {
            receiver_id: ActiveValue::NotSet,
            receiver_upi: ActiveValue::Set(upi.clone()),
            receiver_name: ActiveValue::Set(name.clone()),
            category_id: ActiveValue::Set(DEFAULT_CATEGORY_ID),
        });

        Receiver::insert_many(models)
            .on_conflict(
                OnConflict::column(receiver::Column::ReceiverUpi)
                    .update_columns([receiver::Column::ReceiverName])
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        Ok(())
    }

    /// Identifier assigned to each of `upis`, read back after an upsert.
    pub async fn ids_by_upi<C: ConnectionTrait>(
        conn: &C,
        upis: &[String],
    ) -> AppResult<HashMap<String, i32>> {
        let mapping = Receiver::find()
            .filter(receiver::Column::ReceiverUpi.is_in(upis.iter().cloned()))
            .all(conn)
            .await?
            .into_iter()
            .map(|model| (model.receiver_upi, model.receiver_id))
            .collect();

        Ok(mapping)
    }
}
