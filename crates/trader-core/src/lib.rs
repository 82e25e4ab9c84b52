//! 트레이딩 계좌 연동 코어.
//!
//! 브로커 OAuth 토큰의 도메인 타입, 저장소 추상화(`TokenStore`),
//! 저장 시 암호화(`TokenCipher`)를 제공합니다.

pub mod crypto;
pub mod domain;

pub use crypto::{CryptoError, TokenCipher};
pub use domain::{
    mask_token, AccessTokenPair, AccountId, ConsumerCredentials, EncryptedTokenRow,
    InMemoryTokenStore, RequestToken, TokenStore, TokenStoreError,
};
