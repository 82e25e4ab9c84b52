//! OAuth 1.0 (HMAC-SHA1) 요청 서명.
//!
//! E*TRADE는 서명 기준 문자열(signature base string)을 바이트 단위로 검증하므로
//! 정규화와 퍼센트 인코딩 규칙이 조금만 달라도 `401 signature_invalid`가 발생합니다.
//!
//! # 서명 절차
//!
//! 1. nonce: 16바이트 난수 → base64 → 영숫자 외 문자 제거
//! 2. timestamp: Unix 초
//! 3. OAuth 파라미터 + 요청 파라미터 병합 (키 기준 정렬, 중복 시 요청 파라미터 우선)
//! 4. 기준 문자열: `METHOD&enc(정규화 URL)&enc(정규화 파라미터)`
//! 5. 서명 키: `enc(consumer_secret)&enc(token_secret)`
//! 6. `Authorization: OAuth k="v", ...` (OAuth 파라미터와 서명만 포함)
//!
//! 요청 파라미터(`oauth_callback`, `oauth_verifier`, API 쿼리 파라미터)는 서명에는
//! 포함되지만 헤더가 아닌 쿼리 문자열로 전송됩니다.

use std::collections::{BTreeMap, HashMap};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{rngs::OsRng, RngCore};
use reqwest::Url;
use sha1::Sha1;
use trader_core::ConsumerCredentials;

use crate::ExchangeError;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 비예약 문자(`A-Z a-z 0-9 - . _ ~`)를 제외한 모든 바이트를 인코딩.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// nonce 생성에 사용하는 난수 바이트 수.
const NONCE_BYTES: usize = 16;

/// OAuth 1.0 서명기.
///
/// 컨슈머 자격 증명만 보관하며 상태가 없으므로 여러 태스크에서 공유할 수 있습니다.
#[derive(Debug, Clone)]
pub struct OAuthSigner {
    credentials: ConsumerCredentials,
}

impl OAuthSigner {
    pub fn new(credentials: ConsumerCredentials) -> Self {
        Self { credentials }
    }

    pub fn consumer_key(&self) -> &str {
        &self.credentials.consumer_key
    }

    /// `Authorization` 헤더 값 생성.
    ///
    /// `token`이 없으면 `oauth_token`을 생략합니다 (요청 토큰 발급 단계).
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        extra_params: &BTreeMap<String, String>,
        token: Option<&str>,
        token_secret: Option<&str>,
    ) -> Result<String, ExchangeError> {
        let nonce = generate_nonce();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.sign_with(
            method,
            url,
            extra_params,
            token,
            token_secret,
            &nonce,
            &timestamp,
        )
    }

    /// nonce와 timestamp를 고정해 헤더 생성.
    #[allow(clippy::too_many_arguments)]
    pub fn sign_with(
        &self,
        method: &str,
        url: &str,
        extra_params: &BTreeMap<String, String>,
        token: Option<&str>,
        token_secret: Option<&str>,
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, ExchangeError> {
        let mut oauth_params = BTreeMap::new();
        oauth_params.insert(
            "oauth_consumer_key".to_string(),
            self.credentials.consumer_key.clone(),
        );
        oauth_params.insert("oauth_nonce".to_string(), nonce.to_string());
        oauth_params.insert(
            "oauth_signature_method".to_string(),
            SIGNATURE_METHOD.to_string(),
        );
        oauth_params.insert("oauth_timestamp".to_string(), timestamp.to_string());
        oauth_params.insert("oauth_version".to_string(), OAUTH_VERSION.to_string());
        if let Some(token) = token {
            oauth_params.insert("oauth_token".to_string(), token.to_string());
        }

        let merged = oauth_params
            .iter()
            .chain(extra_params.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()));

        let base_string = signature_base_string(method, url, merged)?;
        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.credentials.consumer_secret),
            percent_encode(token_secret.unwrap_or_default())
        );
        let signature = hmac_sha1(&signing_key, &base_string)?;

        oauth_params.insert("oauth_signature".to_string(), signature);

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }
}

/// RFC 3986 퍼센트 인코딩 (공백은 `%20`, `*`는 `%2A`, `~`는 그대로).
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// 서명용 URL 정규화.
///
/// 스킴/호스트 소문자화, 기본 포트(80/443) 제거, 경로 유지, 쿼리 제거.
/// 빈 경로는 `/`가 되고 경로의 퍼센트 이스케이프는 디코딩하지 않습니다
/// (RFC 5849 3.4.1.2의 base string URI 형식).
pub fn normalize_url(url: &str) -> Result<String, ExchangeError> {
    let parsed = Url::parse(url)
        .map_err(|e| ExchangeError::Configuration(format!("잘못된 URL '{}': {}", url, e)))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| ExchangeError::Configuration(format!("호스트가 없는 URL: {}", url)))?;

    // Url은 스킴 기본 포트를 None으로 돌려준다
    let port = parsed
        .port()
        .map(|p| format!(":{}", p))
        .unwrap_or_default();

    Ok(format!(
        "{}://{}{}{}",
        parsed.scheme(),
        host.to_lowercase(),
        port,
        parsed.path()
    ))
}

/// 파라미터 정규화: 키 기준 정렬 후 `enc(k)=enc(v)`를 `&`로 연결.
///
/// 같은 키가 여러 번 나오면 마지막 값이 사용됩니다.
pub fn normalize_parameters<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();

    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// 서명 기준 문자열 생성.
pub fn signature_base_string<I, K, V>(
    method: &str,
    url: &str,
    params: I,
) -> Result<String, ExchangeError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let normalized_url = normalize_url(url)?;
    let normalized_params = normalize_parameters(params);

    Ok(format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(&normalized_url),
        percent_encode(&normalized_params)
    ))
}

/// OAuth nonce 생성.
///
/// 16바이트 난수를 base64로 인코딩한 뒤 영숫자가 아닌 문자(`+`, `/`, `=`)를 제거합니다.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE64
        .encode(bytes)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn hmac_sha1(key: &str, data: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| ExchangeError::Configuration(format!("HMAC-SHA1 초기화 실패: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// `key=value&...` 형식의 OAuth 응답 본문 파싱.
///
/// 값은 URL 디코딩되며, 같은 키가 반복되면 마지막 값이 남습니다.
pub fn parse_oauth_response(body: &str) -> Result<HashMap<String, String>, ExchangeError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body.trim())
        .map_err(|e| ExchangeError::UpstreamProtocol(format!("응답 본문 파싱 실패: {}", e)))?;
    Ok(pairs.into_iter().collect())
}

/// 토큰 발급 응답 (요청 토큰, 액세스 토큰 공통).
#[derive(Debug, Clone, Default)]
pub struct OAuthTokenResponse {
    pub oauth_token: Option<String>,
    pub oauth_token_secret: Option<String>,
    pub oauth_callback_confirmed: Option<String>,
}

impl OAuthTokenResponse {
    /// 응답 본문 파싱 (`parse_oauth_response` 규칙, 반복 키는 마지막 값).
    pub fn parse(body: &str) -> Result<Self, ExchangeError> {
        let mut fields = parse_oauth_response(body)?;
        Ok(Self {
            oauth_token: fields.remove("oauth_token"),
            oauth_token_secret: fields.remove("oauth_token_secret"),
            oauth_callback_confirmed: fields.remove("oauth_callback_confirmed"),
        })
    }

    /// 토큰과 시크릿을 꺼냄. 둘 중 하나라도 없거나 비어 있으면 프로토콜 오류.
    pub fn into_token_pair(self) -> Result<(String, String), ExchangeError> {
        let token = self
            .oauth_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ExchangeError::UpstreamProtocol("oauth_token 누락".to_string()))?;
        let secret = self
            .oauth_token_secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ExchangeError::UpstreamProtocol("oauth_token_secret 누락".to_string()))?;
        Ok((token, secret))
    }

    pub fn callback_confirmed(&self) -> bool {
        self.oauth_callback_confirmed
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn signer() -> OAuthSigner {
        OAuthSigner::new(ConsumerCredentials::new("CKEY", "CSECRET"))
    }

    fn callback_oob() -> BTreeMap<String, String> {
        BTreeMap::from([("oauth_callback".to_string(), "oob".to_string())])
    }

    /// 헤더에서 `key="value"` 값을 추출.
    fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
        header
            .trim_start_matches("OAuth ")
            .split(", ")
            .find_map(|pair| pair.strip_prefix(&format!("{}=\"", key)))
            .map(|v| v.trim_end_matches('"'))
    }

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("a+b"), "a%2Bb");
        assert_eq!(percent_encode("*"), "%2A");
        assert_eq!(percent_encode("~user"), "~user");
        assert_eq!(percent_encode("A-z_0.9~"), "A-z_0.9~");
        assert_eq!(percent_encode("k=v&x"), "k%3Dv%26x");
        assert_eq!(percent_encode("한"), "%ED%95%9C");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://ApiSB.Etrade.com:443/oauth/request_token?x=1").unwrap(),
            "https://apisb.etrade.com/oauth/request_token"
        );
        assert_eq!(
            normalize_url("http://example.com:80/a/b").unwrap(),
            "http://example.com/a/b"
        );
        assert_eq!(
            normalize_url("http://127.0.0.1:8080/oauth/access_token").unwrap(),
            "http://127.0.0.1:8080/oauth/access_token"
        );
        assert_eq!(
            normalize_url("https://api.etrade.com").unwrap(),
            "https://api.etrade.com/"
        );
        assert_eq!(
            normalize_url("http://EXAMPLE.COM:80/r%20v/X?id=123").unwrap(),
            "http://example.com/r%20v/X"
        );
        assert!(matches!(
            normalize_url("not a url"),
            Err(ExchangeError::Configuration(_))
        ));
    }

    #[test]
    fn test_normalize_parameters() {
        let normalized = normalize_parameters([
            ("oauth_version", "1.0"),
            ("b", "two words"),
            ("a", "x*y"),
        ]);
        assert_eq!(normalized, "a=x%2Ay&b=two%20words&oauth_version=1.0");

        // 마지막 값 우선
        assert_eq!(normalize_parameters([("k", "1"), ("k", "2")]), "k=2");
    }

    #[test]
    fn test_signature_base_string() {
        let base = signature_base_string(
            "get",
            "https://apisb.etrade.com/oauth/request_token",
            [
                ("oauth_consumer_key", "CKEY"),
                ("oauth_callback", "oob"),
                ("oauth_nonce", "abc123"),
                ("oauth_signature_method", "HMAC-SHA1"),
                ("oauth_timestamp", "1700000000"),
                ("oauth_version", "1.0"),
            ],
        )
        .unwrap();

        assert_eq!(
            base,
            "GET&https%3A%2F%2Fapisb.etrade.com%2Foauth%2Frequest_token&\
             oauth_callback%3Doob%26oauth_consumer_key%3DCKEY%26oauth_nonce%3Dabc123%26\
             oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1700000000%26oauth_version%3D1.0"
        );
    }

    #[test]
    fn test_request_token_header_vector() {
        let header = signer()
            .sign_with(
                "GET",
                "https://apisb.etrade.com/oauth/request_token",
                &callback_oob(),
                None,
                None,
                "abc123",
                "1700000000",
            )
            .unwrap();

        assert_eq!(
            header,
            "OAuth oauth_consumer_key=\"CKEY\", oauth_nonce=\"abc123\", \
             oauth_signature=\"V0XeeBSWYtUWlTohcNOaUZEoOts%3D\", \
             oauth_signature_method=\"HMAC-SHA1\", oauth_timestamp=\"1700000000\", \
             oauth_version=\"1.0\""
        );
    }

    #[test]
    fn test_access_token_header_vector() {
        let extra = BTreeMap::from([("oauth_verifier".to_string(), "VER 1".to_string())]);
        let header = signer()
            .sign_with(
                "GET",
                "https://apisb.etrade.com/oauth/access_token",
                &extra,
                Some("RTOKEN"),
                Some("RSECRET"),
                "n0nce",
                "1700000000",
            )
            .unwrap();

        assert_eq!(
            header_value(&header, "oauth_signature"),
            Some("EqEakzi4CuhjNAZwy9uDXzaCkWE%3D")
        );
        assert_eq!(header_value(&header, "oauth_token"), Some("RTOKEN"));
        assert!(header_value(&header, "oauth_verifier").is_none());
    }

    #[test]
    fn test_header_scenario() {
        let header = signer()
            .authorization_header(
                "GET",
                "https://apisb.etrade.com/oauth/request_token",
                &callback_oob(),
                None,
                None,
            )
            .unwrap();

        assert!(header.starts_with("OAuth oauth_consumer_key=\"CKEY\""));
        assert!(header_value(&header, "oauth_token").is_none());
        assert!(header_value(&header, "oauth_callback").is_none());

        let signature = header_value(&header, "oauth_signature").unwrap();
        let decoded = percent_encoding::percent_decode_str(signature)
            .decode_utf8()
            .unwrap();
        // SHA-1 다이제스트는 20바이트
        assert_eq!(BASE64.decode(decoded.as_bytes()).unwrap().len(), 20);
    }

    #[test]
    fn test_nonce_changes_only_nonce_and_signature() {
        let signer = signer();
        let sign = |nonce: &str| {
            signer
                .sign_with(
                    "GET",
                    "https://apisb.etrade.com/v1/accounts/list",
                    &BTreeMap::new(),
                    Some("ATOKEN"),
                    Some("ASECRET"),
                    nonce,
                    "1700000000",
                )
                .unwrap()
        };

        let a = sign("nonceA");
        let b = sign("nonceB");
        assert_eq!(a, sign("nonceA"));
        assert_ne!(a, b);

        let fields = |h: &str| -> Vec<String> {
            h.trim_start_matches("OAuth ")
                .split(", ")
                .filter(|p| !p.starts_with("oauth_nonce=") && !p.starts_with("oauth_signature="))
                .map(str::to_string)
                .collect()
        };
        assert_eq!(fields(&a), fields(&b));
        assert_ne!(
            header_value(&a, "oauth_signature"),
            header_value(&b, "oauth_signature")
        );
    }

    #[test]
    fn test_generate_nonce() {
        let nonce = generate_nonce();
        assert!(!nonce.is_empty() && nonce.len() <= 24);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(nonce, generate_nonce());
    }

    #[test]
    fn test_parse_oauth_response() {
        let parsed = parse_oauth_response(
            "oauth_token=abc%2Bdef&oauth_token_secret=s%3D1&oauth_callback_confirmed=true\n",
        )
        .unwrap();
        assert_eq!(parsed["oauth_token"], "abc+def");
        assert_eq!(parsed["oauth_token_secret"], "s=1");

        let response = OAuthTokenResponse::parse("oauth_token=t&oauth_callback_confirmed=true").unwrap();
        assert!(response.callback_confirmed());
        assert!(matches!(
            response.into_token_pair(),
            Err(ExchangeError::UpstreamProtocol(_))
        ));

        let empty = OAuthTokenResponse::parse("oauth_token=&oauth_token_secret=x").unwrap();
        assert!(empty.into_token_pair().is_err());
    }

    #[test]
    fn test_token_response_repeated_key_keeps_last() {
        let body = "oauth_token=OLD&oauth_token=NEW&oauth_token_secret=S";
        assert_eq!(parse_oauth_response(body).unwrap()["oauth_token"], "NEW");

        let (token, secret) = OAuthTokenResponse::parse(body)
            .unwrap()
            .into_token_pair()
            .unwrap();
        assert_eq!(token, "NEW");
        assert_eq!(secret, "S");

        // 첫 번째 '='에서만 분리
        let response = OAuthTokenResponse::parse("oauth_token=a=b&oauth_token_secret=c").unwrap();
        assert_eq!(response.oauth_token.as_deref(), Some("a=b"));
    }

    proptest! {
        #[test]
        fn prop_normalization_ignores_insertion_order(
            params in proptest::collection::btree_map("[a-z_]{1,8}", "\\PC{0,12}", 0..8)
        ) {
            let forward: Vec<_> = params.iter().collect();
            let reversed: Vec<_> = params.iter().rev().collect();
            let normalized = normalize_parameters(forward);
            prop_assert_eq!(&normalized, &normalize_parameters(reversed));

            let keys: Vec<&str> = normalized
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|p| p.split('=').next().unwrap_or_default())
                .collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(keys, sorted);
        }

        #[test]
        fn prop_percent_encode_round_trips(value in "\\PC{0,32}") {
            let encoded = percent_encode(&value);
            prop_assert!(encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-._~%".contains(c)));
            let decoded = percent_encoding::percent_decode_str(&encoded)
                .decode_utf8()
                .unwrap();
            prop_assert_eq!(decoded.as_ref(), value.as_str());
        }
    }
}
