//! Upstream HTTP clients -- reward site and redemption host.

pub mod schema;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use self::schema::{Envelope, LotteryData, RedeemedQuota, UserInfoData};
use crate::config::UpstreamConfig;
use crate::credentials::RedemptionConfig;
use crate::error::{snippet, CallError};

/// Every call the check-in workflow makes to the outside world.
///
/// A call only yields `Ok` for an HTTP 200 with a decodable body; the
/// envelope's `success` flag is left for the caller to judge.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Spin the lottery for a redemption code.
    async fn lottery(&self, token: &str) -> Result<Envelope<LotteryData>, CallError>;

    /// Direct daily sign-in.
    async fn direct_sign(&self, token: &str) -> Result<Envelope<Value>, CallError>;

    /// Redeem `code` on the second host.
    async fn redeem(
        &self,
        auth: &RedemptionConfig,
        code: &str,
    ) -> Result<Envelope<RedeemedQuota>, CallError>;

    async fn user_info(&self, token: &str) -> Result<Envelope<UserInfoData>, CallError>;

    /// Bare spin; the body is passed through untouched.
    async fn spin(&self, token: &str) -> Result<Envelope<Value>, CallError>;
}

/// `reqwest` implementation posing as a desktop browser.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
    config: UpstreamConfig,
}

impl HttpUpstream {
    pub fn new(config: UpstreamConfig) -> Result<Self, CallError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| CallError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn bearer(&self, url: &str, token: &str) -> RequestBuilder {
        self.client
            .post(url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&json!({}))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        step: &'static str,
        req: RequestBuilder,
    ) -> Result<Envelope<T>, CallError> {
        let resp = req.send().await.map_err(|e| {
            error!(step, error = %e, "request failed");
            CallError::from(e)
        })?;

        let status = resp.status();
        info!(step, status = status.as_u16(), "upstream responded");

        let body = resp.text().await.map_err(CallError::from)?;
        if status != StatusCode::OK {
            error!(step, status = status.as_u16(), body = %snippet(&body), "unexpected status");
            return Err(CallError::http(status.as_u16(), &body));
        }

        debug!(step, body = %snippet(&body), "response body");
        serde_json::from_str(&body).map_err(|e| CallError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn lottery(&self, token: &str) -> Result<Envelope<LotteryData>, CallError> {
        let req = self.bearer(&self.config.lottery_url, token);
        self.send("lottery", req).await
    }

    async fn direct_sign(&self, token: &str) -> Result<Envelope<Value>, CallError> {
        let req = self.bearer(&self.config.sign_url, token);
        self.send("sign", req).await
    }

    async fn redeem(
        &self,
        auth: &RedemptionConfig,
        code: &str,
    ) -> Result<Envelope<RedeemedQuota>, CallError> {
        let user_header = HeaderName::from_bytes(self.config.user_id_header.as_bytes())
            .map_err(|e| CallError::Transport(format!("invalid user id header: {e}")))?;

        let req = self
            .client
            .post(&self.config.topup_url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .header(user_header, auth.user_id.as_str())
            .header(header::COOKIE, format!("session={}", auth.session))
            .json(&json!({ "key": code }));
        self.send("redeem", req).await
    }

    async fn user_info(&self, token: &str) -> Result<Envelope<UserInfoData>, CallError> {
        let req = self.bearer(&self.config.user_info_url, token);
        self.send("user_info", req).await
    }

    async fn spin(&self, token: &str) -> Result<Envelope<Value>, CallError> {
        let req = self.bearer(self.config.effective_spin_url(), token);
        self.send("spin", req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap as AxumHeaders;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Number;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(AxumHeaders, Value)>>>;

    async fn stub_server(seen: Seen) -> String {
        let lottery_seen = seen.clone();
        let topup_seen = seen.clone();
        let app = Router::new()
            .route(
                "/api/lottery/spin",
                post(move |headers: AxumHeaders, Json(body): Json<Value>| {
                    let seen = lottery_seen.clone();
                    async move {
                        seen.lock().unwrap().push((headers, body));
                        Json(json!({
                            "success": true,
                            "message": "ok",
                            "data": {"cdk": "CODE-1", "quota": 100, "times": 1, "label": "small"}
                        }))
                    }
                }),
            )
            .route(
                "/api/user/topup",
                post(move |headers: AxumHeaders, Json(body): Json<Value>| {
                    let seen = topup_seen.clone();
                    async move {
                        seen.lock().unwrap().push((headers, body));
                        Json(json!({"success": true, "message": "", "data": 100}))
                    }
                }),
            )
            .route(
                "/api/checkin",
                post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "expired token") }),
            )
            .route("/api/user/info", post(|| async { "<html>not json</html>" }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base: &str) -> HttpUpstream {
        HttpUpstream::new(UpstreamConfig {
            lottery_url: format!("{base}/api/lottery/spin"),
            sign_url: format!("{base}/api/checkin"),
            user_info_url: format!("{base}/api/user/info"),
            topup_url: format!("{base}/api/user/topup"),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lottery_sends_bearer_and_empty_body() {
        let seen = Seen::default();
        let base = stub_server(seen.clone()).await;
        let client = client_for(&base);

        let env = client.lottery("tok-123").await.unwrap();
        assert!(env.success);
        assert_eq!(env.data.unwrap().code(), Some("CODE-1"));

        let seen = seen.lock().unwrap();
        let (headers, body) = &seen[0];
        assert_eq!(headers["authorization"], "Bearer tok-123");
        assert!(headers["user-agent"].to_str().unwrap().contains("Chrome"));
        assert_eq!(body, &json!({}));
    }

    #[tokio::test]
    async fn test_redeem_uses_cookie_and_user_header() {
        let seen = Seen::default();
        let base = stub_server(seen.clone()).await;
        let client = client_for(&base);

        let auth = RedemptionConfig {
            session: "sess-abc".into(),
            user_id: "4242".into(),
        };
        let env = client.redeem(&auth, "CODE-1").await.unwrap();
        assert_eq!(env.data.unwrap().0, Some(Number::from(100)));

        let seen = seen.lock().unwrap();
        let (headers, body) = &seen[0];
        assert_eq!(headers["cookie"], "session=sess-abc");
        assert_eq!(headers["new-api-user"], "4242");
        assert!(headers.get("authorization").is_none());
        assert_eq!(body, &json!({"key": "CODE-1"}));
    }

    #[tokio::test]
    async fn test_non_200_is_http_error() {
        let base = stub_server(Seen::default()).await;
        let err = client_for(&base).direct_sign("tok").await.unwrap_err();
        assert_eq!(
            err,
            CallError::Http {
                status: 401,
                body: "expired token".into()
            }
        );
    }

    #[tokio::test]
    async fn test_garbage_body_is_decode_error() {
        let base = stub_server(Seen::default()).await;
        let err = client_for(&base).user_info("tok").await.unwrap_err();
        assert!(matches!(err, CallError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = client_for("http://127.0.0.1:1");
        let err = client.lottery("tok").await.unwrap_err();
        assert!(matches!(err, CallError::Transport(_)));
    }
}
