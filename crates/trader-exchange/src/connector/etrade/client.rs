//! E*TRADE 서명 API 클라이언트.
//!
//! 저장된 계좌 액세스 토큰으로 REST API를 호출합니다.
//! 토큰이 서버 측에서 만료되었으면 `401`이 `UpstreamRejected`로 반환되며,
//! 이때는 핸드셰이크를 다시 시작해야 합니다.

use std::{collections::BTreeMap, sync::Arc};

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::instrument;
use trader_core::AccountId;

use super::auth::EtradeOAuth;
use crate::ExchangeError;

const JSON_CONTENT_TYPE: &str = "application/json";

/// E*TRADE API 클라이언트.
#[derive(Debug, Clone)]
pub struct EtradeClient {
    oauth: Arc<EtradeOAuth>,
}

impl EtradeClient {
    pub fn new(oauth: Arc<EtradeOAuth>) -> Self {
        Self { oauth }
    }

    /// OAuth 참조 반환.
    pub fn oauth(&self) -> &Arc<EtradeOAuth> {
        &self.oauth
    }

    /// 서명된 GET 요청 후 본문을 문자열로 반환.
    ///
    /// `query`는 서명에 포함되고 URL 쿼리로 전송됩니다.
    pub async fn get_text(
        &self,
        account_id: AccountId,
        path: &str,
        query: &BTreeMap<String, String>,
    ) -> Result<String, ExchangeError> {
        self.get(account_id, path, query, None).await
    }

    /// 서명된 GET 요청 후 JSON 역직렬화.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        account_id: AccountId,
        path: &str,
        query: &BTreeMap<String, String>,
    ) -> Result<T, ExchangeError> {
        let body = self
            .get(account_id, path, query, Some(JSON_CONTENT_TYPE))
            .await?;

        serde_json::from_str(&body).map_err(|e| {
            ExchangeError::UpstreamProtocol(format!("JSON 파싱 실패 ({}): {}", path, e))
        })
    }

    /// 연동 계좌 목록 조회 (`/v1/accounts/list`).
    #[instrument(skip(self))]
    pub async fn list_accounts(
        &self,
        account_id: AccountId,
    ) -> Result<serde_json::Value, ExchangeError> {
        self.get_json(account_id, "/v1/accounts/list", &BTreeMap::new())
            .await
    }

    async fn get(
        &self,
        account_id: AccountId,
        path: &str,
        query: &BTreeMap<String, String>,
        accept: Option<&str>,
    ) -> Result<String, ExchangeError> {
        let (path, mut params) = split_path_query(path)?;
        params.extend(query.iter().map(|(k, v)| (k.clone(), v.clone())));

        let tokens = self.oauth.get_access_token(account_id).await?;
        let url = self.oauth.config().api_url(path);

        self.oauth
            .send_signed_accepting(
                Method::GET,
                &url,
                &params,
                Some((
                    tokens.access_token.as_str(),
                    tokens.access_token_secret.as_str(),
                )),
                accept,
            )
            .await
    }
}

/// `path`에 붙은 `?query`를 분리해 서명 파라미터로 변환.
///
/// 같은 키는 `query` 인자 값이 우선합니다.
fn split_path_query(path: &str) -> Result<(&str, BTreeMap<String, String>), ExchangeError> {
    let Some((path, inline)) = path.split_once('?') else {
        return Ok((path, BTreeMap::new()));
    };

    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(inline).map_err(|e| {
        ExchangeError::Configuration(format!("잘못된 쿼리 문자열 '{}': {}", inline, e))
    })?;
    Ok((path, pairs.into_iter().collect()))
}
