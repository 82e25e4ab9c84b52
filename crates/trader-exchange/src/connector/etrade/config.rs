//! E*TRADE 연동 설정.
//!
//! 환경변수 기반으로 로드하며, 시크릿은 `SecretString`으로 보관합니다.
//!
//! | 환경변수 | 기본값 |
//! |----------|--------|
//! | `ETRADE_CONSUMER_KEY` | (필수) |
//! | `ETRADE_CONSUMER_SECRET` | (필수) |
//! | `ETRADE_CALLBACK_URL` | `http://localhost:4200/etrade-review-trade/callback` |
//! | `ETRADE_ENVIRONMENT` | `sandbox` |
//! | `ETRADE_BASE_URL` | 환경별 기본 URL |
//! | `ETRADE_AUTHORIZE_URL` | `https://us.etrade.com/e/t/etws/authorize` |
//! | `ETRADE_ENCRYPTION_KEY` | (샌드박스에서는 임시 키 생성) |
//! | `ETRADE_TIMEOUT_SECS` | `30` |
//! | `ETRADE_ENABLED` | `true` |

use std::{fmt, str::FromStr, time::Duration};

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;
use trader_core::{ConsumerCredentials, TokenCipher};

use crate::ExchangeError;

/// 샌드박스 API 기본 URL.
pub const SANDBOX_BASE_URL: &str = "https://apisb.etrade.com";

/// 실전 API 기본 URL.
pub const PRODUCTION_BASE_URL: &str = "https://api.etrade.com";

/// 사용자 인가 페이지 기본 URL.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://us.etrade.com/e/t/etws/authorize";

/// 기본 콜백 URL.
pub const DEFAULT_CALLBACK_URL: &str = "http://localhost:4200/etrade-review-trade/callback";

/// 업스트림 호출 기본 타임아웃.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 개발용 자리표시자 키 접두사.
const PLACEHOLDER_KEY_PREFIX: &str = "default-";

/// E*TRADE API 환경.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EtradeEnvironment {
    /// 샌드박스 (모의)
    #[default]
    Sandbox,
    /// 실전
    Production,
}

impl EtradeEnvironment {
    /// 환경별 API 기본 URL.
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "SANDBOX",
            Self::Production => "PRODUCTION",
        }
    }
}

impl FromStr for EtradeEnvironment {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" | "sb" => Ok(Self::Sandbox),
            "production" | "prod" | "live" => Ok(Self::Production),
            other => Err(ExchangeError::Configuration(format!(
                "알 수 없는 E*TRADE 환경: {}",
                other
            ))),
        }
    }
}

/// E*TRADE 연동 설정.
#[derive(Clone)]
pub struct EtradeConfig {
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub callback_url: String,
    pub environment: EtradeEnvironment,
    /// API 기본 URL (기본값은 환경에 따라 결정)
    pub base_url: String,
    pub authorize_url: String,
    /// 토큰 암호화 키
    pub encryption_key: Option<SecretString>,
    /// 업스트림 연결/요청 타임아웃
    pub timeout: Duration,
    pub enabled: bool,
}

impl fmt::Debug for EtradeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtradeConfig")
            .field("consumer_key", &"***")
            .field("consumer_secret", &"***")
            .field("callback_url", &self.callback_url)
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("authorize_url", &self.authorize_url)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl EtradeConfig {
    /// 샌드박스 기본값으로 설정 생성.
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        let environment = EtradeEnvironment::default();
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: SecretString::from(consumer_secret.into()),
            callback_url: DEFAULT_CALLBACK_URL.to_string(),
            environment,
            base_url: environment.base_url().to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            encryption_key: None,
            timeout: DEFAULT_TIMEOUT,
            enabled: true,
        }
    }

    /// 환경 설정 (기본 URL도 함께 변경).
    pub fn with_environment(mut self, environment: EtradeEnvironment) -> Self {
        self.environment = environment;
        self.base_url = environment.base_url().to_string();
        self
    }

    /// API 기본 URL 재정의 (테스트 서버 등).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_authorize_url(mut self, authorize_url: impl Into<String>) -> Self {
        self.authorize_url = authorize_url.into();
        self
    }

    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = callback_url.into();
        self
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 환경변수에서 설정 로드.
    ///
    /// # Errors
    /// 컨슈머 키/시크릿이 없거나 값 형식이 잘못되면 `ExchangeError::Configuration` 반환.
    pub fn from_env() -> Result<Self, ExchangeError> {
        dotenvy::dotenv().ok();

        let consumer_key = required_env("ETRADE_CONSUMER_KEY")?;
        let consumer_secret = required_env("ETRADE_CONSUMER_SECRET")?;

        let environment = match std::env::var("ETRADE_ENVIRONMENT") {
            Ok(value) => value.parse()?,
            Err(_) => EtradeEnvironment::default(),
        };

        let mut config = Self::new(consumer_key, consumer_secret).with_environment(environment);

        if let Ok(base_url) = std::env::var("ETRADE_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Ok(authorize_url) = std::env::var("ETRADE_AUTHORIZE_URL") {
            config.authorize_url = authorize_url;
        }
        if let Ok(callback_url) = std::env::var("ETRADE_CALLBACK_URL") {
            config.callback_url = callback_url;
        }
        if let Ok(key) = std::env::var("ETRADE_ENCRYPTION_KEY") {
            if !key.trim().is_empty() {
                config.encryption_key = Some(SecretString::from(key));
            }
        }
        config.timeout = Duration::from_secs(env_var_parse("ETRADE_TIMEOUT_SECS", 30));
        config.enabled = env_var_bool("ETRADE_ENABLED", true);

        config.validate()?;
        Ok(config)
    }

    /// 필수 값 검증.
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.consumer_key.trim().is_empty() {
            return Err(ExchangeError::Configuration(
                "E*TRADE 컨슈머 키가 설정되지 않았습니다".to_string(),
            ));
        }
        if self.consumer_secret.expose_secret().trim().is_empty() {
            return Err(ExchangeError::Configuration(
                "E*TRADE 컨슈머 시크릿이 설정되지 않았습니다".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ExchangeError::Configuration(
                "타임아웃은 0보다 커야 합니다".to_string(),
            ));
        }
        Ok(())
    }

    /// 서명용 컨슈머 자격 증명.
    pub fn consumer_credentials(&self) -> ConsumerCredentials {
        ConsumerCredentials::new(
            self.consumer_key.clone(),
            self.consumer_secret.expose_secret().to_string(),
        )
    }

    /// 요청 토큰 발급 시 사용할 `oauth_callback` 값.
    ///
    /// 샌드박스는 verifier를 수동 입력하는 `oob`(out-of-band)를 사용합니다.
    pub fn oauth_callback(&self) -> &str {
        match self.environment {
            EtradeEnvironment::Sandbox => "oob",
            EtradeEnvironment::Production => &self.callback_url,
        }
    }

    /// 토큰 암호화기 생성.
    ///
    /// 키가 없거나 `default-`로 시작하면 샌드박스에서는 임시 키를 생성하고,
    /// 실전 환경에서는 설정 오류를 반환합니다.
    pub fn token_cipher(&self) -> Result<TokenCipher, ExchangeError> {
        let configured = self
            .encryption_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .filter(|k| !k.is_empty() && !k.starts_with(PLACEHOLDER_KEY_PREFIX));

        let key = match (configured, self.environment) {
            (Some(key), _) => key,
            (None, EtradeEnvironment::Sandbox) => {
                warn!("ETRADE_ENCRYPTION_KEY 미설정: 개발용 임시 키를 생성합니다 (재시작 시 저장된 토큰 복호화 불가)");
                TokenCipher::generate_key()
            }
            (None, EtradeEnvironment::Production) => {
                return Err(ExchangeError::Configuration(
                    "실전 환경에서는 ETRADE_ENCRYPTION_KEY가 필요합니다".to_string(),
                ));
            }
        };

        TokenCipher::new(&key).map_err(|e| ExchangeError::Configuration(e.to_string()))
    }

    pub fn request_token_url(&self) -> String {
        format!("{}/oauth/request_token", self.base_url)
    }

    pub fn access_token_url(&self) -> String {
        format!("{}/oauth/access_token", self.base_url)
    }

    pub fn renew_access_token_url(&self) -> String {
        format!("{}/oauth/renew_access_token", self.base_url)
    }

    pub fn revoke_access_token_url(&self) -> String {
        format!("{}/oauth/revoke_access_token", self.base_url)
    }

    /// API 경로를 절대 URL로 변환.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// 필수 환경변수 조회 (빈 값은 누락으로 취급).
fn required_env(key: &str) -> Result<String, ExchangeError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ExchangeError::Configuration(format!("{} 환경변수가 설정되지 않았습니다", key)))
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}
