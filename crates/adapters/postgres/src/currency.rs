//! 货币仓储

use async_trait::async_trait;
use save_common::GameSaveId;
use save_domain::Currency;
use save_errors::AppResult;
use save_ports::EntityRepositoryPort;
use sqlx::PgPool;

use crate::error_mapper::{ensure_updated, map_sqlx_error};

pub struct PgCurrencyRepository {
    pool: PgPool,
}

impl PgCurrencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityRepositoryPort<Currency> for PgCurrencyRepository {
    async fn find(&self, id: &GameSaveId) -> AppResult<Option<Currency>> {
        sqlx::query_as::<_, CurrencyRow>(
            "SELECT gold, diamond, emerald, amethyst FROM currency WHERE game_save_id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Into::into))
        .map_err(map_sqlx_error)
    }

    async fn update(&self, id: &GameSaveId, value: &Currency) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE currency
            SET gold = $2, diamond = $3, emerald = $4, amethyst = $5, updated_at = NOW()
            WHERE game_save_id = $1
            "#,
        )
        .bind(id.0)
        .bind(value.gold)
        .bind(value.diamond)
        .bind(value.emerald)
        .bind(value.amethyst)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        ensure_updated(result.rows_affected(), "currency", id)
    }
}

#[derive(sqlx::FromRow)]
struct CurrencyRow {
    gold: i64,
    diamond: i64,
    emerald: i64,
    amethyst: i64,
}

impl From<CurrencyRow> for Currency {
    fn from(row: CurrencyRow) -> Self {
        Self {
            gold: row.gold,
            diamond: row.diamond,
            emerald: row.emerald,
            amethyst: row.amethyst,
        }
    }
}
