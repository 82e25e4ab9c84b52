//! OAuth 1.0 자격 증명 및 토큰 타입.
//!
//! 브로커(E*TRADE) 계좌 연동에 사용되는 컨슈머 자격 증명, 요청 토큰,
//! 액세스 토큰과 DB에 저장되는 암호화된 토큰 레코드를 정의합니다.
//!
//! # 보안
//!
//! 시크릿을 담는 타입은 모두 `Debug` 출력 시 값을 `***`로 마스킹합니다.
//! 로그에 토큰을 남겨야 할 때는 [`mask_token`]을 사용하세요.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 연동 계좌 식별자.
pub type AccountId = Uuid;

/// 로그 출력용 토큰 마스킹.
///
/// 8자 초과 토큰은 앞 4자와 뒤 4자만 남기고, 그 외에는 `***`를 반환합니다.
///
/// ```
/// use trader_core::mask_token;
///
/// assert_eq!(mask_token("abcd1234wxyz"), "abcd...wxyz");
/// assert_eq!(mask_token("short"), "***");
/// ```
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

// =============================================================================
// 컨슈머 자격 증명
// =============================================================================

/// 등록된 애플리케이션의 OAuth 컨슈머 자격 증명.
///
/// 프로세스 시작 시 한 번 구성되며 모든 서명 작업에서 읽기 전용으로 공유됩니다.
#[derive(Clone)]
pub struct ConsumerCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl ConsumerCredentials {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }
}

impl fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("consumer_key", &mask_token(&self.consumer_key))
            .field("consumer_secret", &"***")
            .finish()
    }
}

// =============================================================================
// 요청 토큰
// =============================================================================

/// 사용자 인가 전 단계의 임시 요청 토큰.
///
/// 서버 측에서 약 5분 후 만료됩니다. 이 코어는 요청 토큰을 저장하지 않으며,
/// 세션 등에 보관할지는 호출자가 결정합니다.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToken {
    pub token: String,
    pub token_secret: String,
}

impl RequestToken {
    pub fn new(token: impl Into<String>, token_secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_secret: token_secret.into(),
        }
    }
}

impl fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestToken")
            .field("token", &mask_token(&self.token))
            .field("token_secret", &"***")
            .finish()
    }
}

// =============================================================================
// 액세스 토큰
// =============================================================================

/// 연동 계좌의 평문 액세스 토큰 쌍.
///
/// 메모리에서만 평문으로 존재하며, 저장 시에는 항상 암호화됩니다.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessTokenPair {
    pub access_token: String,
    pub access_token_secret: String,
}

impl AccessTokenPair {
    pub fn new(access_token: impl Into<String>, access_token_secret: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
        }
    }
}

impl fmt::Debug for AccessTokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenPair")
            .field("access_token", &mask_token(&self.access_token))
            .field("access_token_secret", &"***")
            .finish()
    }
}

/// DB에 저장되는 암호화된 액세스 토큰 레코드.
///
/// 계좌 ID당 최대 1개의 레코드만 존재합니다 (upsert).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedTokenRow {
    /// 연동 계좌 ID (유일 키)
    pub account_id: AccountId,
    /// 암호화된 액세스 토큰 (base64)
    pub access_token_encrypted: String,
    /// 암호화된 액세스 토큰 시크릿 (base64)
    pub access_token_secret_encrypted: String,
    /// 최초 저장 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl EncryptedTokenRow {
    /// 새 레코드 생성 (생성/갱신 시각은 현재 시각).
    pub fn new(
        account_id: AccountId,
        access_token_encrypted: String,
        access_token_secret_encrypted: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            access_token_encrypted,
            access_token_secret_encrypted,
            created_at: now,
            updated_at: now,
        }
    }
}
