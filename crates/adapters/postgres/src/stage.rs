//! 关卡仓储

use async_trait::async_trait;
use save_common::GameSaveId;
use save_domain::Stage;
use save_errors::AppResult;
use save_ports::EntityRepositoryPort;
use sqlx::PgPool;

use crate::error_mapper::{ensure_updated, map_sqlx_error};

pub struct PgStageRepository {
    pool: PgPool,
}

impl PgStageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityRepositoryPort<Stage> for PgStageRepository {
    async fn find(&self, id: &GameSaveId) -> AppResult<Option<Stage>> {
        sqlx::query_as::<_, StageRow>(
            "SELECT current_stage, max_stage FROM stages WHERE game_save_id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Into::into))
        .map_err(map_sqlx_error)
    }

    async fn update(&self, id: &GameSaveId, value: &Stage) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE stages
            SET current_stage = $2, max_stage = $3, updated_at = NOW()
            WHERE game_save_id = $1
            "#,
        )
        .bind(id.0)
        .bind(value.current_stage)
        .bind(value.max_stage)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        ensure_updated(result.rows_affected(), "stages", id)
    }
}

#[derive(sqlx::FromRow)]
struct StageRow {
    current_stage: i64,
    max_stage: i64,
}

impl From<StageRow> for Stage {
    fn from(row: StageRow) -> Self {
        Self {
            current_stage: row.current_stage,
            max_stage: row.max_stage,
        }
    }
}
