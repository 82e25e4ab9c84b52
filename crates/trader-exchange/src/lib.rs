//! 브로커 연동 커넥터.
//!
//! 현재 E*TRADE OAuth 1.0 연동을 제공합니다.
//!
//! - `connector::etrade`: 요청 서명, 인증 흐름, 토큰 저장, 서명 API 호출
//! - `error`: 연동 실패 분류
//! - `retry`: 호출자 측 재시도 정책

pub mod connector;
pub mod error;
pub mod retry;

pub use connector::etrade::{
    EtradeClient, EtradeConfig, EtradeEnvironment, EtradeOAuth, OAuthSigner,
    RequestTokenResponse,
};
pub use error::{ExchangeError, LinkFailure};
