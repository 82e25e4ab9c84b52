//! 토큰 시크릿 저장용 암호화.
//!
//! 브로커 액세스 토큰을 DB 텍스트 컬럼에 저장하기 위해 AES-256-GCM으로
//! 암호화하고 base64로 인코딩합니다.
//!
//! # 저장 형식
//!
//! ```text
//! base64( nonce(12) || ciphertext || tag(16) )
//! ```
//!
//! 메시지마다 무작위 nonce를 사용하므로 같은 평문도 매번 다른 암호문이 됩니다.
//!
//! # 키 정규화
//!
//! 설정된 패스프레이즈는 최소 16자 이상이어야 하며, UTF-8 바이트 기준
//! 32바이트로 자르거나 `'0'`으로 채워 AES-256 키로 사용합니다.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// 패스프레이즈 최소 길이 (문자 수).
pub const MIN_KEY_CHARS: usize = 16;

/// AES-256 키 길이 (바이트).
const KEY_LEN: usize = 32;

/// GCM nonce 길이 (바이트).
const NONCE_LEN: usize = 12;

/// 짧은 키를 채우는 문자.
const KEY_FILLER: u8 = b'0';

/// 암호화 에러.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// 키 설정 오류
    #[error("잘못된 암호화 키: {0}")]
    InvalidKey(String),

    /// 암호화 실패
    #[error("토큰 암호화 실패: {0}")]
    Encrypt(String),

    /// 복호화 실패 (손상된 암호문 또는 키 불일치)
    #[error("토큰 복호화 실패: {0}")]
    Decrypt(String),
}

/// 토큰 암호화/복호화기.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"***")
            .finish()
    }
}

impl TokenCipher {
    /// 패스프레이즈로 암호화기 생성.
    ///
    /// # Errors
    /// 패스프레이즈가 16자 미만이면 `CryptoError::InvalidKey` 반환.
    pub fn new(passphrase: &str) -> Result<Self, CryptoError> {
        let char_count = passphrase.chars().count();
        if char_count < MIN_KEY_CHARS {
            return Err(CryptoError::InvalidKey(format!(
                "암호화 키는 최소 {}자 이상이어야 합니다 (현재 {}자)",
                MIN_KEY_CHARS, char_count
            )));
        }

        let key_bytes = normalize_key(passphrase);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// 평문 토큰 암호화.
    ///
    /// 빈 문자열은 암호화하지 않고 그대로 반환합니다.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    /// 암호화된 토큰 복호화.
    ///
    /// 빈 문자열은 그대로 반환합니다.
    ///
    /// # Errors
    /// base64 디코딩 실패, 길이 부족, 태그 검증 실패(키 불일치/변조),
    /// UTF-8이 아닌 평문이면 `CryptoError::Decrypt` 반환.
    pub fn decrypt(&self, encrypted: &str) -> Result<String, CryptoError> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }

        let payload = BASE64
            .decode(encrypted)
            .map_err(|e| CryptoError::Decrypt(format!("base64 디코딩 실패: {}", e)))?;

        if payload.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt("암호문 길이가 너무 짧습니다".to_string()));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Decrypt(e.to_string()))
    }

    /// 초기 설정용 무작위 키 생성 (32바이트, base64).
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }
}

/// 패스프레이즈를 32바이트 키로 정규화.
fn normalize_key(passphrase: &str) -> [u8; KEY_LEN] {
    let mut key = [KEY_FILLER; KEY_LEN];
    let bytes = passphrase.as_bytes();
    let len = bytes.len().min(KEY_LEN);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}
