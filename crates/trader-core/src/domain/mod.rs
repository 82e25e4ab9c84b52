//! 도메인 타입.

mod oauth_token;
mod token_store;

pub use oauth_token::{
    mask_token, AccessTokenPair, AccountId, ConsumerCredentials, EncryptedTokenRow, RequestToken,
};
pub use token_store::{InMemoryTokenStore, TokenStore, TokenStoreError};
