//! Database connection pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, SqlitePool};
use std::str::FromStr;

/// Pool of the embedded local replica.
pub type LocalPool = SqlitePool;

/// Pool of the remote, authoritative replica.
pub type RemotePool = PgPool;

/// Open (and create if needed) the local SQLite database.
pub async fn create_local_pool(database_url: &str) -> Result<LocalPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Create the remote connection pool.
pub async fn create_remote_pool(database_url: &str) -> Result<RemotePool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run local database migrations.
pub async fn run_local_migrations(pool: &LocalPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations/local").run(pool).await
}

/// Run remote database migrations.
pub async fn run_remote_migrations(pool: &RemotePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations/remote").run(pool).await
}
