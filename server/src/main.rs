#![allow(dead_code)]
mod db_core;
mod email;
mod error;
mod ingest;
mod model;
mod routes;
mod server_config;
mod testing;

use std::{env, net::SocketAddr, sync::Arc};

use axum::{extract::FromRef, Router};
use mimalloc::MiMalloc;
use routes::AppRouter;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// Arc keeps the state clonable when the mock backend is compiled in,
// where DatabaseConnection itself is not Clone.
#[derive(Clone, FromRef)]
struct ServerState {
    conn: Arc<DatabaseConnection>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");

    let state = ServerState {
        conn: Arc::new(conn),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let router = AppRouter::create(state);
    run_server(router).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Shutting down");
        },
        _ = terminate => {
            tracing::info!("Shutting down");
        },
    }
}

async fn run_server(router: Router) {
    let port = env::var("PORT").unwrap_or("8000".to_string());
    tracing::info!("Upiledger server running on http://0.0.0.0:{}", port);
    // check config
    println!("{}", *server_config::cfg);

    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>().unwrap()));
    tracing::debug!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}
