//! 액세스 토큰 암호화 저장 서비스.
//!
//! 평문 토큰 쌍을 `TokenCipher`로 암호화해 `TokenStore`에 저장하고,
//! 조회 시 복호화합니다.

use std::sync::Arc;

use tracing::{debug, info};
use trader_core::{AccessTokenPair, AccountId, EncryptedTokenRow, TokenCipher, TokenStore};

use crate::ExchangeError;

/// 액세스 토큰 서비스.
#[derive(Clone)]
pub struct EtradeTokenService {
    store: Arc<dyn TokenStore>,
    cipher: Arc<TokenCipher>,
}

impl EtradeTokenService {
    pub fn new(store: Arc<dyn TokenStore>, cipher: Arc<TokenCipher>) -> Self {
        Self { store, cipher }
    }

    /// 토큰 쌍을 암호화해 저장 (계좌당 1건, 기존 레코드는 교체).
    pub async fn store_access_token(
        &self,
        account_id: AccountId,
        tokens: &AccessTokenPair,
    ) -> Result<EncryptedTokenRow, ExchangeError> {
        let row = EncryptedTokenRow::new(
            account_id,
            self.cipher.encrypt(&tokens.access_token)?,
            self.cipher.encrypt(&tokens.access_token_secret)?,
        );

        let saved = self.store.save(row).await?;
        info!(%account_id, "액세스 토큰 저장 완료");
        Ok(saved)
    }

    /// 저장된 토큰 쌍을 복호화해 조회.
    pub async fn get_access_token(
        &self,
        account_id: AccountId,
    ) -> Result<Option<AccessTokenPair>, ExchangeError> {
        let Some(row) = self.store.find_by_account(account_id).await? else {
            debug!(%account_id, "저장된 액세스 토큰 없음");
            return Ok(None);
        };

        Ok(Some(AccessTokenPair::new(
            self.cipher.decrypt(&row.access_token_encrypted)?,
            self.cipher.decrypt(&row.access_token_secret_encrypted)?,
        )))
    }

    /// 저장된 토큰 삭제. 없어도 성공.
    pub async fn delete_access_token(&self, account_id: AccountId) -> Result<(), ExchangeError> {
        self.store.delete_by_account(account_id).await?;
        info!(%account_id, "액세스 토큰 삭제");
        Ok(())
    }

    /// 저장된 토큰 존재 여부 (업스트림 유효성은 확인하지 않음).
    pub async fn has_valid_token(&self, account_id: AccountId) -> Result<bool, ExchangeError> {
        Ok(self.store.find_by_account(account_id).await?.is_some())
    }
}
