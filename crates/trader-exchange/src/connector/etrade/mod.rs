//! E*TRADE 커넥터.
//!
//! OAuth 1.0 (HMAC-SHA1) 요청 서명, 3-legged 인증 흐름, 액세스 토큰의
//! 암호화 저장과 서명된 API 호출을 제공합니다.
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trader_core::InMemoryTokenStore;
//! use trader_exchange::connector::etrade::{EtradeConfig, EtradeOAuth};
//!
//! let oauth = EtradeOAuth::new(EtradeConfig::from_env()?, Arc::new(InMemoryTokenStore::new()))?;
//! let request = oauth.get_request_token().await?;
//! println!("인가 URL: {}", request.authorization_url);
//!
//! // 사용자가 인가 후 받은 verifier로 교환
//! oauth
//!     .exchange_for_access_token(&request.request_token, &verifier, account_id)
//!     .await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod signer;
pub mod token;

pub use auth::{
    EtradeOAuth, RenewAccessTokenResponse, RequestTokenResponse, RevokeAccessTokenResponse,
};
pub use client::EtradeClient;
pub use config::{EtradeConfig, EtradeEnvironment};
pub use signer::{OAuthSigner, OAuthTokenResponse};
pub use token::EtradeTokenService;
