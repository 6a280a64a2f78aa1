//! Postgres connection pool wrapper (ground: teacher's `db::Database`
//! construction in `main.rs` — `db::timescale` is kept in the workspace as
//! reference but this crate has no time-series-specific storage needs).

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}
