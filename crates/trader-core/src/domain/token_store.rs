//! 액세스 토큰 저장소 추상화.
//!
//! 계좌 ID → 암호화된 액세스 토큰 레코드의 영속 매핑을 제공합니다.
//! 실제 구현은 영속성 계층(`trader-data`)에 있으며, 이 모듈은 trait와
//! 테스트/데모용 인메모리 구현만 포함합니다.
//!
//! # 동시성 요구사항
//!
//! 같은 계좌에 대한 동시 `save`는 레코드를 중복 생성하거나 손상시키면 안 됩니다.
//! 구현체는 조회 후 쓰기(read-then-write) 대신 원자적 upsert를 사용해야 합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{AccountId, EncryptedTokenRow};

/// TokenStore 에러.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// 동시 upsert 경합 (유일 제약 위반)
    #[error("토큰 저장 충돌: account_id={0}")]
    Conflict(AccountId),

    /// 저장소 백엔드 에러
    #[error("토큰 저장소 에러: {0}")]
    Backend(String),
}

/// 액세스 토큰 저장소 trait.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 계좌 ID로 레코드 조회.
    async fn find_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<EncryptedTokenRow>, TokenStoreError>;

    /// 레코드 저장 (계좌 ID 기준 원자적 upsert).
    ///
    /// 기존 레코드가 있으면 토큰 값과 `updated_at`만 교체하고 `created_at`은 유지합니다.
    async fn save(&self, row: EncryptedTokenRow) -> Result<EncryptedTokenRow, TokenStoreError>;

    /// 계좌 ID로 레코드 삭제. 레코드가 없어도 에러가 아닙니다.
    async fn delete_by_account(&self, account_id: AccountId) -> Result<(), TokenStoreError>;
}

/// 인메모리 토큰 저장소.
///
/// 테스트와 데모용입니다. upsert는 단일 쓰기 락 안에서 수행되므로 원자적입니다.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    rows: RwLock<HashMap<AccountId, EncryptedTokenRow>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 레코드 수.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// 저장된 레코드가 없는지 여부.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn find_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<EncryptedTokenRow>, TokenStoreError> {
        Ok(self.rows.read().await.get(&account_id).cloned())
    }

    async fn save(&self, row: EncryptedTokenRow) -> Result<EncryptedTokenRow, TokenStoreError> {
        let mut rows = self.rows.write().await;
        let saved = match rows.get(&row.account_id) {
            Some(existing) => EncryptedTokenRow {
                created_at: existing.created_at,
                updated_at: Utc::now(),
                ..row
            },
            None => row,
        };
        rows.insert(saved.account_id, saved.clone());
        Ok(saved)
    }

    async fn delete_by_account(&self, account_id: AccountId) -> Result<(), TokenStoreError> {
        self.rows.write().await.remove(&account_id);
        Ok(())
    }
}
