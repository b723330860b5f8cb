//! Bilibili implementation of [`PlatformApi`] over HTTPS.
//!
//! Every response is wrapped in the platform's `{code, message, data}`
//! envelope; a non-zero `code` is surfaced as [`ChatRelayError::Platform`].

use crate::defaults;
use crate::error::{ChatRelayError, Result};
use crate::platform::{Credential, Identity, LoginTicket, PlatformApi, PollOutcome, QrCodeStatus};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::{SystemTime, UNIX_EPOCH};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/104.0.0.0 Safari/537.36";

/// White, scrolling, default size.
const DANMAKU_COLOR: &str = "16777215";
const DANMAKU_MODE: &str = "1";
const DANMAKU_FONTSIZE: &str = "25";

/// Base URLs of the platform services the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Login service, e.g. `https://passport.bilibili.com`.
    pub passport: String,
    /// Main web API, e.g. `https://api.bilibili.com`.
    pub api: String,
    /// Message-center API used for credential validation.
    pub vc: String,
    /// Live-streaming API.
    pub live: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            passport: "https://passport.bilibili.com".to_string(),
            api: "https://api.bilibili.com".to_string(),
            vc: "https://api.vc.bilibili.com".to_string(),
            live: "https://api.live.bilibili.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Route every service to the same base URL (used against local mocks).
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            passport: base.clone(),
            api: base.clone(),
            vc: base.clone(),
            live: base,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T> {
        if self.code != 0 {
            return Err(ChatRelayError::Platform {
                code: self.code,
                message: self.message,
            });
        }
        self.data.ok_or_else(|| ChatRelayError::Platform {
            code: self.code,
            message: "response carried no data".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QrGenerateData {
    #[serde(default)]
    url: String,
    #[serde(default)]
    qrcode_key: String,
}

#[derive(Debug, Deserialize)]
struct QrPollData {
    code: i64,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct NavData {
    #[serde(rename = "isLogin", default)]
    is_login: bool,
    #[serde(default)]
    mid: u64,
    #[serde(default)]
    uname: String,
    #[serde(default)]
    face: String,
}

/// HTTP client for the Bilibili web and live APIs.
#[derive(Debug, Clone)]
pub struct BilibiliClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl BilibiliClient {
    /// Client against the production endpoints.
    pub fn new() -> Result<Self> {
        Self::with_endpoints(Endpoints::default())
    }

    pub fn with_endpoints(endpoints: Endpoints) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(defaults::HTTP_TIMEOUT)
            .build()?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<Envelope<T>> {
        let status = response.status();
        if !status.is_success() {
            return Err(ChatRelayError::Platform {
                code: i64::from(status.as_u16()),
                message: format!("HTTP status {}", status),
            });
        }
        Ok(response.json::<Envelope<T>>().await?)
    }
}

#[async_trait::async_trait]
impl PlatformApi for BilibiliClient {
    #[tracing::instrument(skip_all)]
    async fn request_login_ticket(&self) -> Result<LoginTicket> {
        let url = format!(
            "{}/x/passport-login/web/qrcode/generate",
            self.endpoints.passport
        );
        let response = self.http.get(url).send().await?;
        let data: QrGenerateData = Self::decode(response).await?.into_data()?;
        tracing::debug!(ticket = %data.qrcode_key, "login ticket issued");
        Ok(LoginTicket {
            ticket: data.qrcode_key,
            verification_url: data.url,
        })
    }

    #[tracing::instrument(skip_all)]
    async fn poll_login_ticket(&self, ticket: &str) -> Result<PollOutcome> {
        let url = format!("{}/x/passport-login/web/qrcode/poll", self.endpoints.passport);
        let response = self
            .http
            .get(url)
            .query(&[("qrcode_key", ticket)])
            .send()
            .await?;
        let data: QrPollData = Self::decode(response).await?.into_data()?;
        let status = QrCodeStatus::from_code(data.code);
        Ok(PollOutcome {
            status,
            credential_url: (!data.url.is_empty()).then_some(data.url),
        })
    }

    #[tracing::instrument(skip_all, fields(user_id = %credential.user_id))]
    async fn validate_credential(&self, credential: &Credential) -> Result<bool> {
        let url = format!("{}/link_setting/v1/link_setting/get", self.endpoints.vc);
        let response = self
            .http
            .post(url)
            .header(reqwest::header::COOKIE, &credential.cookie)
            .form(&[
                ("msg_notify", "1"),
                ("show_unfollowed_msg", "1"),
                ("build", "0"),
                ("mobi_app", "web"),
                ("csrf_token", credential.csrf.as_str()),
                ("csrf", credential.csrf.as_str()),
            ])
            .send()
            .await?;
        let envelope: Envelope<serde_json::Value> = Self::decode(response).await?;
        if envelope.code != 0 {
            tracing::info!(code = envelope.code, message = %envelope.message, "credential rejected");
        }
        Ok(envelope.code == 0)
    }

    #[tracing::instrument(skip_all, fields(user_id = %credential.user_id))]
    async fn fetch_identity(&self, credential: &Credential) -> Result<Identity> {
        let url = format!("{}/x/web-interface/nav", self.endpoints.api);
        let response = self
            .http
            .get(url)
            .header(reqwest::header::COOKIE, &credential.cookie)
            .send()
            .await?;
        let nav: NavData = Self::decode(response).await?.into_data()?;
        if !nav.is_login {
            return Err(ChatRelayError::AuthFailure {
                message: "platform reports the session is not logged in".to_string(),
            });
        }
        Ok(Identity {
            user_id: nav.mid,
            name: nav.uname,
            avatar_url: nav.face,
        })
    }

    #[tracing::instrument(skip_all, fields(room_id = %room_id))]
    async fn send_chat_message(
        &self,
        credential: &Credential,
        room_id: &str,
        text: &str,
    ) -> Result<()> {
        let url = format!("{}/msg/send", self.endpoints.live);
        let rnd = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .to_string();
        let response = self
            .http
            .post(url)
            .header(reqwest::header::COOKIE, &credential.cookie)
            .form(&[
                ("roomid", room_id),
                ("msg", text),
                ("bubble", "0"),
                ("color", DANMAKU_COLOR),
                ("mode", DANMAKU_MODE),
                ("fontsize", DANMAKU_FONTSIZE),
                ("rnd", rnd.as_str()),
                ("csrf", credential.csrf.as_str()),
                ("csrf_token", credential.csrf.as_str()),
            ])
            .send()
            .await?;
        let envelope: Envelope<serde_json::Value> = Self::decode(response).await?;
        if envelope.code != 0 {
            return Err(ChatRelayError::SendFailure {
                message: format!("code {}: {}", envelope.code, envelope.message),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> Credential {
        Credential {
            user_id: "42".to_string(),
            csrf: "csrf-token".to_string(),
            cookie: "SESSDATA=session".to_string(),
        }
    }

    async fn client_for(server: &MockServer) -> BilibiliClient {
        BilibiliClient::with_endpoints(Endpoints::single(&server.uri())).unwrap()
    }

    #[test]
    fn test_default_endpoints_are_https() {
        let endpoints = Endpoints::default();
        for url in [
            &endpoints.passport,
            &endpoints.api,
            &endpoints.vc,
            &endpoints.live,
        ] {
            assert!(url.starts_with("https://"), "not https: {}", url);
        }
    }

    #[test]
    fn test_single_endpoint_strips_trailing_slash() {
        let endpoints = Endpoints::single("http://127.0.0.1:9/");
        assert_eq!(endpoints.live, "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_request_login_ticket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/passport-login/web/qrcode/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "message": "0",
                "data": { "url": "https://example.test/qr?key=abc", "qrcode_key": "abc" }
            })))
            .mount(&server)
            .await;

        let ticket = client_for(&server).await.request_login_ticket().await.unwrap();
        assert_eq!(ticket.ticket, "abc");
        assert_eq!(ticket.verification_url, "https://example.test/qr?key=abc");
    }

    #[tokio::test]
    async fn test_poll_maps_inner_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/passport-login/web/qrcode/poll"))
            .and(query_param("qrcode_key", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": { "code": 86090, "url": "", "message": "scanned" }
            })))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.poll_login_ticket("abc").await.unwrap();
        assert_eq!(outcome.status, QrCodeStatus::WaitingConfirm);
        assert_eq!(outcome.credential_url, None);
    }

    #[tokio::test]
    async fn test_poll_success_carries_credential_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/passport-login/web/qrcode/poll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": { "code": 0, "url": "https://x.test/?DedeUserID=1&bili_jct=c&SESSDATA=s" }
            })))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.poll_login_ticket("abc").await.unwrap();
        assert_eq!(outcome.status, QrCodeStatus::Success);
        assert!(outcome.credential_url.unwrap().contains("SESSDATA=s"));
    }

    #[tokio::test]
    async fn test_validate_credential_sends_cookie_and_csrf() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/link_setting/v1/link_setting/get"))
            .and(header("cookie", "SESSDATA=session"))
            .and(body_string_contains("csrf=csrf-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0, "data": {}})),
            )
            .mount(&server)
            .await;

        let valid = client_for(&server)
            .await
            .validate_credential(&credential())
            .await
            .unwrap();
        assert!(valid);
    }

    #[tokio::test]
    async fn test_validate_credential_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/link_setting/v1/link_setting/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": -101,
                "message": "not logged in"
            })))
            .mount(&server)
            .await;

        let valid = client_for(&server)
            .await
            .validate_credential(&credential())
            .await
            .unwrap();
        assert!(!valid);
    }

    #[tokio::test]
    async fn test_fetch_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/web-interface/nav"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": { "isLogin": true, "mid": 42, "uname": "streamer", "face": "https://img.test/a.png" }
            })))
            .mount(&server)
            .await;

        let identity = client_for(&server)
            .await
            .fetch_identity(&credential())
            .await
            .unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(identity.name, "streamer");
    }

    #[tokio::test]
    async fn test_fetch_identity_not_logged_in() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/web-interface/nav"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": { "isLogin": false }
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).await.fetch_identity(&credential()).await;
        assert!(matches!(result, Err(ChatRelayError::AuthFailure { .. })));
    }

    #[tokio::test]
    async fn test_send_chat_message_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/msg/send"))
            .and(body_string_contains("roomid=1000"))
            .and(body_string_contains("msg=hello"))
            .and(body_string_contains("csrf_token=csrf-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0, "data": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .send_chat_message(&credential(), "1000", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_chat_message_error_code_is_send_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/msg/send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 10030,
                "message": "too fast"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .send_chat_message(&credential(), "1000", "hello")
            .await;
        match result {
            Err(ChatRelayError::SendFailure { message }) => assert!(message.contains("10030")),
            other => panic!("expected SendFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_status_is_platform_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/passport-login/web/qrcode/generate"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = client_for(&server).await.request_login_ticket().await;
        assert!(matches!(
            result,
            Err(ChatRelayError::Platform { code: 502, .. })
        ));
    }
}
