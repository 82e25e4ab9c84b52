//! 호출자 측 재시도 유틸리티.
//!
//! 연동 서비스 자체는 재시도하지 않습니다. 토큰 교환 경합(`Conflict`)이나
//! 업스트림 일시 장애(타임아웃, 429, 5xx)를 다시 시도할지는 호출자가 결정하며,
//! 이 모듈은 그 정책을 한 곳에 모아 둡니다.
//!
//! verifier는 한 번만 교환할 수 있으므로 `Conflict` 재시도는 같은 verifier로
//! 교환이 다시 성공할 수 있는 경우(예: 업스트림이 멱등 처리)에만 의미가 있습니다.
//!
//! ```rust,ignore
//! use trader_exchange::retry::{with_retry, RetryConfig};
//!
//! let token = with_retry(&RetryConfig::fast(), || async {
//!     oauth.get_access_token(account_id).await
//! })
//! .await?;
//! ```

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::{debug, warn};

use crate::ExchangeError;

/// 재시도 설정.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (초기 시도 제외).
    pub max_retries: u32,
    /// 기본 대기 시간 (에러에 권장 대기 시간이 없을 때 사용).
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 지수 백오프 배수 (1.0이면 고정 간격).
    pub backoff_multiplier: f64,
    /// ±25% 지터 추가 여부.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// 짧은 지연, 적은 재시도.
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// 단일 시도.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// `attempt`번째 재시도 전 대기 시간.
    fn delay_for(&self, attempt: u32, error: &ExchangeError) -> Duration {
        let base = error
            .retry_delay_ms()
            .map(Duration::from_millis)
            .unwrap_or(self.base_delay);

        let max_secs = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = base.as_secs_f64() * self.backoff_multiplier.max(1.0).powi(exponent);
        // f64 단계에서 상한을 적용 (inf/NaN 포함)
        let mut secs = scaled.min(max_secs);

        if self.add_jitter && secs > 0.0 {
            secs *= rand::thread_rng().gen_range(0.75..=1.25);
        }
        Duration::try_from_secs_f64(secs.min(max_secs)).unwrap_or(self.max_delay)
    }
}

/// 재시도 가능한 에러(`ExchangeError::is_retryable`)에 한해 작업을 반복 실행.
///
/// 치명적 에러(설정, 암호화)와 재시도 불가 에러는 즉시 반환합니다.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, ExchangeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    with_retry_if(config, operation, |e| !e.is_fatal() && e.is_retryable()).await
}

/// 사용자 정의 조건으로 재시도 여부를 결정하는 래퍼.
pub async fn with_retry_if<T, F, Fut, P>(
    config: &RetryConfig,
    operation: F,
    should_retry: P,
) -> Result<T, ExchangeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
    P: Fn(&ExchangeError) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "재시도 후 성공");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!(error = %e, "재시도 대상 아님, 즉시 실패 반환");
                    return Err(e);
                }
                if attempt >= config.max_retries {
                    warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "최대 재시도 횟수 초과"
                    );
                    return Err(e);
                }

                let delay = config.delay_for(attempt, &e);
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "재시도 대기 중"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
