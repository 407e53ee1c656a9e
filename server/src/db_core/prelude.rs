pub use entity::prelude::*;
pub use entity::{receiver, transactions};

pub use sea_orm::entity::prelude::*;
pub use sea_orm::{
    sea_query::OnConflict, ActiveValue, ConnectionTrait, DatabaseConnection, FromQueryResult,
    QueryOrder, QuerySelect, TransactionTrait,
};
