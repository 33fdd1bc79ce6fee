//! 设备令牌仓储
//!
//! 每个用户只保留最近注册的若干令牌，超出时淘汰最早的

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::DeviceTokenRepositoryTrait;
use crate::error::Result;

/// 设备令牌仓储
pub struct DeviceTokenRepository {
    pool: PgPool,
}

impl DeviceTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceTokenRepositoryTrait for DeviceTokenRepository {
    async fn list(&self, user_id: Uuid) -> Result<Vec<String>> {
        let tokens: Vec<String> = sqlx::query_scalar(
            "SELECT token FROM device_tokens WHERE user_id = $1 ORDER BY seq ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }

    async fn register(&self, user_id: Uuid, token: &str, cap: usize) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO device_tokens (user_id, token)
            VALUES ($1, $2)
            ON CONFLICT (user_id, token) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM device_tokens
            WHERE user_id = $1
              AND seq NOT IN (
                  SELECT seq FROM device_tokens
                  WHERE user_id = $1
                  ORDER BY seq DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(user_id)
        .bind(cap as i64)
        .execute(&mut *tx)
        .await?;

        let tokens: Vec<String> = sqlx::query_scalar(
            "SELECT token FROM device_tokens WHERE user_id = $1 ORDER BY seq ASC",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(tokens)
    }

    async fn remove(&self, user_id: Uuid, tokens: &[String]) -> Result<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM device_tokens WHERE user_id = $1 AND token = ANY($2)")
            .bind(user_id)
            .bind(tokens)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
