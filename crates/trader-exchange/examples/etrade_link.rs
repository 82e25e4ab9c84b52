//! E*TRADE 계좌 연동 데모.
//!
//! ```bash
//! ETRADE_CONSUMER_KEY=... ETRADE_CONSUMER_SECRET=... \
//!     cargo run -p trader-exchange --example etrade_link
//! ```
//!
//! 인가 URL을 브라우저에서 열고, 표시된 verifier 코드를 입력하면
//! 액세스 토큰을 교환해 계좌 목록을 조회합니다.

use std::{io::Write, sync::Arc};

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trader_core::InMemoryTokenStore;
use trader_exchange::{
    retry::{with_retry, RetryConfig},
    EtradeClient, EtradeConfig, EtradeOAuth,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EtradeConfig::from_env()?;
    info!(environment = config.environment.as_str(), "E*TRADE 연동 데모 시작");

    let oauth = Arc::new(EtradeOAuth::new(config, Arc::new(InMemoryTokenStore::new()))?);
    let account_id = Uuid::new_v4();

    let request = with_retry(&RetryConfig::fast(), || oauth.get_request_token()).await?;
    println!("\n브라우저에서 다음 URL을 열어 인가하세요:\n{}\n", request.authorization_url);

    print!("verifier 코드 입력: ");
    std::io::stdout().flush()?;
    let mut verifier = String::new();
    std::io::stdin().read_line(&mut verifier)?;

    // verifier는 1회용이므로 교환 자체는 재시도하지 않음
    oauth
        .exchange_for_access_token(&request.request_token, verifier.trim(), account_id)
        .await
        .map_err(|e| anyhow::anyhow!("액세스 토큰 교환 실패 ({:?}): {}", e.link_failure(), e))?;
    info!(%account_id, "계좌 연동 완료");

    let client = EtradeClient::new(oauth.clone());
    let accounts = with_retry(&RetryConfig::default(), || client.list_accounts(account_id)).await?;
    println!("{}", serde_json::to_string_pretty(&accounts)?);

    let renewed = oauth.renew_access_token(account_id).await?;
    info!(success = renewed.is_success(), message = %renewed.message, "토큰 갱신 결과");

    Ok(())
}
