use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::env;

use crate::email::session::RawMessage;

pub async fn setup() -> DatabaseConnection {
    dotenvy::dotenv().ok();
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    Database::connect(db_options)
        .await
        .expect("Database connection failed")
}

/// Creates both tables when absent so integration tests can run against an
/// empty database.
pub async fn ensure_schema(conn: &DatabaseConnection) {
    use sea_orm::ConnectionTrait;

    conn.execute_unprepared(
        "CREATE TABLE IF NOT EXISTS receiver (
            receiver_id SERIAL PRIMARY KEY,
            receiver_upi TEXT NOT NULL UNIQUE,
            receiver_name TEXT NOT NULL,
            category_id INTEGER NOT NULL DEFAULT 0
        )",
    )
    .await
    .expect("Failed to create receiver table");

    conn.execute_unprepared(
        "CREATE TABLE IF NOT EXISTS transactions (
            transaction_id SERIAL PRIMARY KEY,
            upi_ref_no TEXT NOT NULL UNIQUE,
            amount NUMERIC(12, 2) NOT NULL,
            sender_upi TEXT NOT NULL,
            receiver_id INTEGER REFERENCES receiver (receiver_id),
            transaction_date TIMESTAMP NOT NULL,
            payment_mode TEXT NOT NULL,
            category_id INTEGER,
            is_category_overwritten BOOLEAN NOT NULL DEFAULT FALSE
        )",
    )
    .await
    .expect("Failed to create transactions table");
}

pub fn read_fixture(name: &str) -> Vec<u8> {
    let path = format!("{}/src/testing/data/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read(&path).expect("Unable to read file")
}

/// Wraps an HTML body in a minimal single-part message.
pub fn html_message(seq: u32, html: &str) -> RawMessage {
    let content = format!(
        "From: UPI Alerts <upialerts@bank.example>\r\n\
         To: customer@example.com\r\n\
         Subject: UPI Transaction Alert\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\
         \r\n\
         {html}"
    );

    RawMessage {
        seq,
        content: content.into_bytes(),
    }
}
