//! E*TRADE OAuth 1.0 3-legged 인증 흐름.
//!
//! # 상태 전이 (계좌 연동 1회 기준)
//!
//! ```text
//! [토큰 없음] --get_request_token--> [요청 토큰 발급]
//!     --사용자 인가 (외부)--> [verifier 수신]
//!     --exchange_for_access_token--> [액세스 토큰 저장]
//! [액세스 토큰 저장] --renew_access_token--> [액세스 토큰 저장]
//! [액세스 토큰 저장] --revoke_access_token / delete_access_token--> [토큰 없음]
//! ```
//!
//! 이 타입은 호출 사이에 상태를 갖지 않으며 백그라운드 작업도 하지 않습니다.
//! 모든 업스트림 호출은 하나의 공유 `reqwest::Client`와 설정된 타임아웃을 사용하고,
//! 실패 시 자동 재시도하지 않습니다 (재시도는 `crate::retry`로 호출자가 결정).
//!
//! 응답 본문을 끝까지 읽고 검증한 뒤에만 저장소에 기록하므로, 호출 도중
//! future가 drop되면 저장소는 변경되지 않습니다.

use std::{collections::BTreeMap, sync::Arc};

use reqwest::{header, Client, Method, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use trader_core::{mask_token, AccessTokenPair, AccountId, RequestToken, TokenStore};
use uuid::Uuid;

use super::{
    config::EtradeConfig,
    signer::{OAuthSigner, OAuthTokenResponse},
    token::EtradeTokenService,
};
use crate::ExchangeError;

/// 에러 메시지에 담을 응답 본문 최대 길이.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// 요청 토큰 발급 결과.
#[derive(Debug, Clone, Serialize)]
pub struct RequestTokenResponse {
    /// 사용자를 보낼 E*TRADE 인가 페이지 URL
    pub authorization_url: String,
    /// verifier 교환 시 다시 전달해야 하는 요청 토큰 (약 5분 유효)
    pub request_token: RequestToken,
    pub callback_confirmed: bool,
    pub correlation_id: Uuid,
}

/// 액세스 토큰 갱신 응답.
#[derive(Debug, Clone, Serialize)]
pub struct RenewAccessTokenResponse {
    pub message: String,
}

impl RenewAccessTokenResponse {
    /// 응답 메시지에 "renewed"가 포함되면 성공.
    pub fn is_success(&self) -> bool {
        self.message.to_lowercase().contains("renewed")
    }
}

/// 액세스 토큰 폐기 응답.
#[derive(Debug, Clone, Serialize)]
pub struct RevokeAccessTokenResponse {
    pub message: String,
}

impl RevokeAccessTokenResponse {
    pub fn is_success(&self) -> bool {
        self.message.to_lowercase().contains("revoked")
    }
}

/// E*TRADE OAuth 흐름 관리자.
pub struct EtradeOAuth {
    config: EtradeConfig,
    client: Client,
    signer: OAuthSigner,
    tokens: EtradeTokenService,
}

impl EtradeOAuth {
    /// 설정과 토큰 저장소로 생성.
    ///
    /// # Errors
    /// 설정 검증 실패, 암호화 키 오류, HTTP 클라이언트 생성 실패 시
    /// `ExchangeError::Configuration` 반환.
    pub fn new(config: EtradeConfig, store: Arc<dyn TokenStore>) -> Result<Self, ExchangeError> {
        if !config.enabled {
            return Err(ExchangeError::Configuration(
                "E*TRADE 연동이 비활성화되어 있습니다 (ETRADE_ENABLED=false)".to_string(),
            ));
        }
        config.validate()?;

        let cipher = Arc::new(config.token_cipher()?);
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::Configuration(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        info!(
            environment = config.environment.as_str(),
            base_url = %config.base_url,
            "E*TRADE OAuth 초기화"
        );

        Ok(Self {
            signer: OAuthSigner::new(config.consumer_credentials()),
            tokens: EtradeTokenService::new(store, cipher),
            client,
            config,
        })
    }

    pub fn config(&self) -> &EtradeConfig {
        &self.config
    }

    pub fn signer(&self) -> &OAuthSigner {
        &self.signer
    }

    pub fn tokens(&self) -> &EtradeTokenService {
        &self.tokens
    }

    /// 요청 토큰 발급 및 인가 URL 생성.
    ///
    /// 요청 토큰은 저장하지 않습니다. 세션 등에 보관했다가
    /// `exchange_for_access_token`에 다시 전달해야 합니다.
    pub async fn get_request_token(&self) -> Result<RequestTokenResponse, ExchangeError> {
        let correlation_id = Uuid::new_v4();
        let span = info_span!("etrade_request_token", %correlation_id);

        async move {
            let params = BTreeMap::from([(
                "oauth_callback".to_string(),
                self.config.oauth_callback().to_string(),
            )]);

            let body = self
                .send_signed(Method::GET, &self.config.request_token_url(), &params, None)
                .await?;

            let response = OAuthTokenResponse::parse(&body)?;
            let callback_confirmed = response.callback_confirmed();
            let (token, token_secret) = response.into_token_pair()?;
            let authorization_url = self.authorization_url(&token)?;

            info!(
                request_token = %mask_token(&token),
                callback_confirmed,
                "요청 토큰 발급 완료"
            );

            Ok::<_, ExchangeError>(RequestTokenResponse {
                authorization_url,
                request_token: RequestToken::new(token, token_secret),
                callback_confirmed,
                correlation_id,
            })
        }
        .instrument(span)
        .await
    }

    /// 사용자 인가 페이지 URL (`?key=<컨슈머 키>&token=<요청 토큰>`).
    pub fn authorization_url(&self, request_token: &str) -> Result<String, ExchangeError> {
        Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("key", self.signer.consumer_key()),
                ("token", request_token),
            ],
        )
        .map(String::from)
        .map_err(|e| ExchangeError::Configuration(format!("잘못된 인가 URL: {}", e)))
    }

    /// verifier를 액세스 토큰으로 교환하고 암호화해 저장.
    ///
    /// 같은 계좌의 기존 토큰은 교체됩니다. 응답 형식이 잘못되면 저장하지 않습니다.
    #[instrument(
        skip_all,
        fields(correlation_id = %Uuid::new_v4(), %account_id)
    )]
    pub async fn exchange_for_access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
        account_id: AccountId,
    ) -> Result<AccessTokenPair, ExchangeError> {
        let params = BTreeMap::from([("oauth_verifier".to_string(), verifier.trim().to_string())]);

        let body = self
            .send_signed(
                Method::GET,
                &self.config.access_token_url(),
                &params,
                Some((
                    request_token.token.as_str(),
                    request_token.token_secret.as_str(),
                )),
            )
            .await?;

        let (access_token, access_token_secret) = OAuthTokenResponse::parse(&body)?.into_token_pair()?;
        let tokens = AccessTokenPair::new(access_token, access_token_secret);

        self.tokens.store_access_token(account_id, &tokens).await?;
        info!(
            access_token = %mask_token(&tokens.access_token),
            "액세스 토큰 교환 완료"
        );

        Ok(tokens)
    }

    /// 저장된 액세스 토큰 조회.
    ///
    /// # Errors
    /// 연동 이력이 없으면 `ExchangeError::NotFound` (핸드셰이크 재시작 필요).
    pub async fn get_access_token(
        &self,
        account_id: AccountId,
    ) -> Result<AccessTokenPair, ExchangeError> {
        self.tokens
            .get_access_token(account_id)
            .await?
            .ok_or(ExchangeError::NotFound(account_id))
    }

    /// 저장된 토큰 존재 여부. 업스트림 만료 여부는 확인하지 않습니다.
    pub async fn has_valid_token(&self, account_id: AccountId) -> Result<bool, ExchangeError> {
        self.tokens.has_valid_token(account_id).await
    }

    /// 저장된 토큰 삭제 (연동 해제). 없어도 성공.
    pub async fn delete_access_token(&self, account_id: AccountId) -> Result<(), ExchangeError> {
        self.tokens.delete_access_token(account_id).await
    }

    /// 액세스 토큰 갱신 (2시간 비활성 만료 연장).
    ///
    /// 저장된 레코드는 변경하지 않습니다.
    #[instrument(
        skip_all,
        fields(correlation_id = %Uuid::new_v4(), %account_id)
    )]
    pub async fn renew_access_token(
        &self,
        account_id: AccountId,
    ) -> Result<RenewAccessTokenResponse, ExchangeError> {
        let tokens = self.get_access_token(account_id).await?;

        let body = self
            .send_signed(
                Method::GET,
                &self.config.renew_access_token_url(),
                &BTreeMap::new(),
                Some((
                    tokens.access_token.as_str(),
                    tokens.access_token_secret.as_str(),
                )),
            )
            .await?;

        let response = RenewAccessTokenResponse {
            message: body.trim().to_string(),
        };
        if response.is_success() {
            info!("액세스 토큰 갱신 완료");
        } else {
            warn!(message = %response.message, "액세스 토큰 갱신 응답 확인 필요");
        }
        Ok(response)
    }

    /// 액세스 토큰 폐기. 성공(200) 시 저장된 레코드도 삭제합니다.
    #[instrument(
        skip_all,
        fields(correlation_id = %Uuid::new_v4(), %account_id)
    )]
    pub async fn revoke_access_token(
        &self,
        account_id: AccountId,
    ) -> Result<RevokeAccessTokenResponse, ExchangeError> {
        let tokens = self.get_access_token(account_id).await?;

        let body = self
            .send_signed(
                Method::GET,
                &self.config.revoke_access_token_url(),
                &BTreeMap::new(),
                Some((
                    tokens.access_token.as_str(),
                    tokens.access_token_secret.as_str(),
                )),
            )
            .await?;

        self.tokens.delete_access_token(account_id).await?;
        info!("액세스 토큰 폐기 완료");

        Ok(RevokeAccessTokenResponse {
            message: body.trim().to_string(),
        })
    }

    /// 서명된 요청 전송 후 응답 본문 반환.
    ///
    /// `params`는 서명에 포함되고 쿼리 문자열로 전송됩니다.
    /// `token`은 `(토큰, 토큰 시크릿)` 쌍입니다.
    ///
    /// # Errors
    /// - 응답 없음 (타임아웃, 연결 실패): `UpstreamRejected { status: None }`
    /// - 200 이외 응답: `UpstreamRejected { status: Some(code) }`
    pub async fn send_signed(
        &self,
        method: Method,
        url: &str,
        params: &BTreeMap<String, String>,
        token: Option<(&str, &str)>,
    ) -> Result<String, ExchangeError> {
        self.send_signed_accepting(method, url, params, token, None)
            .await
    }

    /// `Accept` 헤더를 지정해 서명된 요청 전송.
    pub(crate) async fn send_signed_accepting(
        &self,
        method: Method,
        url: &str,
        params: &BTreeMap<String, String>,
        token: Option<(&str, &str)>,
        accept: Option<&str>,
    ) -> Result<String, ExchangeError> {
        let (token, token_secret) = token.unzip();
        let authorization =
            self.signer
                .authorization_header(method.as_str(), url, params, token, token_secret)?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::AUTHORIZATION, authorization);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }

        debug!(%method, url, "E*TRADE 요청 전송");

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, url, "E*TRADE 요청 실패 (응답 없음)");
            ExchangeError::transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::transport(format!("응답 본문 읽기 실패: {}", e)))?;

        if status != StatusCode::OK {
            let message = truncate(body.trim(), MAX_ERROR_BODY_CHARS);
            warn!(status = status.as_u16(), url, %message, "E*TRADE 요청 거부");
            return Err(ExchangeError::rejected(status.as_u16(), message));
        }

        Ok(body)
    }
}

impl std::fmt::Debug for EtradeOAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtradeOAuth")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use trader_core::InMemoryTokenStore;

    use super::*;
    use crate::connector::etrade::config::EtradeEnvironment;

    fn oauth(config: EtradeConfig) -> Result<EtradeOAuth, ExchangeError> {
        EtradeOAuth::new(config, Arc::new(InMemoryTokenStore::new()))
    }

    #[test]
    fn test_authorization_url() {
        let oauth = oauth(EtradeConfig::new("CKEY", "CSECRET")).unwrap();
        assert_eq!(
            oauth.authorization_url("req/tok+en").unwrap(),
            "https://us.etrade.com/e/t/etws/authorize?key=CKEY&token=req%2Ftok%2Ben"
        );
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let mut disabled = EtradeConfig::new("CKEY", "CSECRET");
        disabled.enabled = false;
        assert!(matches!(oauth(disabled), Err(ExchangeError::Configuration(_))));

        let production_without_key =
            EtradeConfig::new("CKEY", "CSECRET").with_environment(EtradeEnvironment::Production);
        assert!(matches!(
            oauth(production_without_key),
            Err(ExchangeError::Configuration(_))
        ));
    }

    #[test]
    fn test_response_success_flags() {
        assert!(RenewAccessTokenResponse {
            message: "Access Token has been renewed".to_string()
        }
        .is_success());
        assert!(!RenewAccessTokenResponse {
            message: "oauth_problem=token_expired".to_string()
        }
        .is_success());
        assert!(RevokeAccessTokenResponse {
            message: "Revoked Access Token".to_string()
        }
        .is_success());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("가나다라", 2), "가나...");
    }

    #[tokio::test]
    async fn test_get_access_token_not_found() {
        let oauth = oauth(EtradeConfig::new("CKEY", "CSECRET")).unwrap();
        let account_id = Uuid::new_v4();

        assert!(matches!(
            oauth.get_access_token(account_id).await,
            Err(ExchangeError::NotFound(id)) if id == account_id
        ));
        assert!(matches!(
            oauth.renew_access_token(account_id).await,
            Err(ExchangeError::NotFound(_))
        ));
        assert!(!oauth.has_valid_token(account_id).await.unwrap());
    }
}
