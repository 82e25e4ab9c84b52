//! E*TRADE 액세스 토큰 저장소 (PostgreSQL).
//!
//! `etrade_oauth_tokens` 테이블에 계좌당 1건의 암호화된 토큰 쌍을 보관합니다.
//! 저장은 `INSERT ... ON CONFLICT (account_id) DO UPDATE`로 한 번에 수행되므로
//! 같은 계좌에 대한 동시 교환도 레코드를 중복 생성하지 않습니다 (마지막 쓰기 우선).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument, warn};
use trader_core::{AccountId, EncryptedTokenRow, TokenStore, TokenStoreError};

/// `etrade_oauth_tokens` 레코드.
#[derive(Debug, Clone, FromRow)]
struct EtradeTokenRecord {
    account_id: AccountId,
    access_token_encrypted: String,
    access_token_secret_encrypted: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EtradeTokenRecord> for EncryptedTokenRow {
    fn from(record: EtradeTokenRecord) -> Self {
        Self {
            account_id: record.account_id,
            access_token_encrypted: record.access_token_encrypted,
            access_token_secret_encrypted: record.access_token_secret_encrypted,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// E*TRADE 토큰 Repository.
#[derive(Debug, Clone)]
pub struct EtradeTokenRepository {
    pool: PgPool,
}

impl EtradeTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// sqlx 에러를 저장소 에러로 변환 (유일 제약 위반은 `Conflict`).
fn map_db_error(account_id: AccountId, err: sqlx::Error) -> TokenStoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            warn!(%account_id, "토큰 저장 충돌 (유일 제약 위반)");
            return TokenStoreError::Conflict(account_id);
        }
    }
    TokenStoreError::Backend(err.to_string())
}

#[async_trait]
impl TokenStore for EtradeTokenRepository {
    #[instrument(skip(self))]
    async fn find_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<EncryptedTokenRow>, TokenStoreError> {
        let record: Option<EtradeTokenRecord> = sqlx::query_as(
            r#"
            SELECT account_id, access_token_encrypted, access_token_secret_encrypted,
                   created_at, updated_at
            FROM etrade_oauth_tokens
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error(account_id, e))?;

        debug!(found = record.is_some(), "토큰 조회");
        Ok(record.map(Into::into))
    }

    #[instrument(skip(self, row), fields(account_id = %row.account_id))]
    async fn save(&self, row: EncryptedTokenRow) -> Result<EncryptedTokenRow, TokenStoreError> {
        let account_id = row.account_id;

        let record: EtradeTokenRecord = sqlx::query_as(
            r#"
            INSERT INTO etrade_oauth_tokens (
                account_id, access_token_encrypted, access_token_secret_encrypted,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (account_id) DO UPDATE SET
                access_token_encrypted = EXCLUDED.access_token_encrypted,
                access_token_secret_encrypted = EXCLUDED.access_token_secret_encrypted,
                updated_at = EXCLUDED.updated_at
            RETURNING account_id, access_token_encrypted, access_token_secret_encrypted,
                      created_at, updated_at
            "#,
        )
        .bind(account_id)
        .bind(&row.access_token_encrypted)
        .bind(&row.access_token_secret_encrypted)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(account_id, e))?;

        info!("토큰 upsert 완료");
        Ok(record.into())
    }

    #[instrument(skip(self))]
    async fn delete_by_account(&self, account_id: AccountId) -> Result<(), TokenStoreError> {
        let result = sqlx::query("DELETE FROM etrade_oauth_tokens WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(account_id, e))?;

        debug!(deleted = result.rows_affected(), "토큰 삭제");
        Ok(())
    }
}
