//! 거래소 커넥터 에러 타입.
//!
//! 계좌 연동 서비스가 실패 원인을 구분할 수 있도록 에러를 분류합니다.
//!
//! | 분류 | 재시도 | 의미 |
//! |------|--------|------|
//! | `Configuration` | 불가 (치명적) | 키/시크릿 누락, 잘못된 URL |
//! | `UpstreamProtocol` | 불가 | OAuth 응답 본문 형식 오류 |
//! | `UpstreamRejected` | 429/5xx/전송 실패만 | 비-200 응답, 타임아웃 |
//! | `Crypto` | 불가 (치명적) | 키 교체 후 미이관 데이터 등 |
//! | `NotFound` | 불가 | 연동 이력 없음 → 핸드셰이크 재시작 |
//! | `Conflict` | 가능 | 동시 upsert 경합 → 교환 전체 재시도 |

use thiserror::Error;
use trader_core::{AccountId, CryptoError, TokenStoreError};

/// 거래소 커넥터 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 설정 오류 (시작 시점에 발생, 요청 단위 아님)
    #[error("설정 오류: {0}")]
    Configuration(String),

    /// OAuth 응답 형식 오류 (필수 필드 누락 등)
    #[error("OAuth 응답 형식 오류: {0}")]
    UpstreamProtocol(String),

    /// 업스트림 호출 실패.
    ///
    /// `status`가 `None`이면 응답을 받지 못한 경우(타임아웃, 연결 실패)입니다.
    #[error("업스트림 호출 실패 ({}): {message}", status_label(.status))]
    UpstreamRejected {
        status: Option<u16>,
        message: String,
    },

    /// 암호화/복호화 실패
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// 저장된 액세스 토큰 없음
    #[error("저장된 액세스 토큰 없음: account_id={0}")]
    NotFound(AccountId),

    /// 동시 upsert 경합
    #[error("토큰 저장 충돌: account_id={0}")]
    Conflict(AccountId),

    /// 토큰 저장소 에러
    #[error("토큰 저장소 에러: {0}")]
    Storage(String),
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {}", code),
        None => "응답 없음".to_string(),
    }
}

impl From<TokenStoreError> for ExchangeError {
    fn from(err: TokenStoreError) -> Self {
        match err {
            TokenStoreError::Conflict(account_id) => Self::Conflict(account_id),
            TokenStoreError::Backend(msg) => Self::Storage(msg),
        }
    }
}

/// 사용자에게 노출할 연동 실패 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    /// 자격 증명 또는 서명이 잘못됨
    Credentials,
    /// 토큰을 저장하지 못함
    Storage,
    /// 연동된 계좌 없음
    NotLinked,
    /// 브로커 측 일시적 장애
    Upstream,
    /// 내부 설정/암호화 문제
    Internal,
}

impl ExchangeError {
    /// 업스트림 응답 거부 에러 생성.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            status: Some(status),
            message: message.into(),
        }
    }

    /// 응답 없이 실패한 업스트림 호출 에러 생성 (타임아웃, 연결 실패).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            status: None,
            message: message.into(),
        }
    }

    /// 업스트림 HTTP 상태 코드.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UpstreamRejected { status, .. } => *status,
            _ => None,
        }
    }

    /// 치명적 에러 여부 (재시도해도 해결되지 않음).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Crypto(_))
    }

    /// 재시도 가능 여부.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::UpstreamRejected { status: None, .. } => true,
            Self::UpstreamRejected {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// 에러별 권장 재시도 대기 시간 (밀리초).
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::Conflict(_) => Some(50),
            Self::UpstreamRejected {
                status: Some(429), ..
            } => Some(5_000),
            _ => None,
        }
    }

    /// 사용자 노출용 실패 유형.
    pub fn link_failure(&self) -> LinkFailure {
        match self {
            Self::NotFound(_) => LinkFailure::NotLinked,
            Self::Conflict(_) | Self::Storage(_) => LinkFailure::Storage,
            Self::UpstreamProtocol(_) => LinkFailure::Credentials,
            Self::UpstreamRejected { .. } if self.is_retryable() => LinkFailure::Upstream,
            Self::UpstreamRejected { .. } => LinkFailure::Credentials,
            Self::Configuration(_) | Self::Crypto(_) => LinkFailure::Internal,
        }
    }
}
