//! JSON request/response plumbing shared by the vendor clients.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::throttle::Throttle;

pub type Query<'a> = [(&'a str, String)];

#[derive(Clone)]
pub struct HttpClient {
    http: Client,
    config: ClientConfig,
    throttle: Throttle,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        let throttle = Throttle::new(config.cooldown, config.max_retries, config.retry_base);
        Ok(Self {
            http,
            config,
            throttle,
        })
    }


    pub async fn get<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.get_with_query(path, &[]).await
    }

    pub async fn get_with_query<T>(&self, path: &str, query: &Query<'_>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .execute(Method::GET, path, query, Option::<&Value>::None)
            .await?;
        Self::parse_json(response).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(Method::POST, path, &[], Some(body)).await?;
        Self::parse_json(response).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(Method::PUT, path, &[], Some(body)).await?;
        Self::parse_json(response).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(Method::PATCH, path, &[], Some(body)).await?;
        Self::parse_json(response).await
    }

    pub async fn send_expect_empty<B>(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let response = self.execute(method, path, query, body).await?;
        Self::ensure_success(response).await
    }

    pub async fn delete(&self, path: &str, query: &Query<'_>) -> Result<()> {
        self.send_expect_empty(Method::DELETE, path, query, Option::<&Value>::None)
            .await
    }

    fn url_for(&self, path: &str) -> String {
        if path.is_empty() {
            return self.config.base_url.trim_end_matches('/').to_string();
        }
        let mut base = self.config.api_root();
        base.push_str(path.trim_start_matches('/'));
        base
    }

    /// Sends the request, repeating it while the failure looks transient.
    async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let payload = body.map(serde_json::to_value).transpose()?;
        let url = self.url_for(path);
        let mut attempt = 0u32;

        loop {
            self.throttle.hit().await;
            let mut request = self.http.request(method.clone(), &url);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(payload) = &payload {
                request = request.json(payload);
            }
            debug!(method = %method, url = %url, attempt, "sending request");

            let retry_after = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !retryable_status(&method, status) || attempt >= self.throttle.max_retries() {
                        return Ok(response);
                    }
                    warn!(method = %method, url = %url, status = %status, "retrying request");
                    parse_retry_after(&response)
                }
                Err(err) => {
                    let err = ApiError::from(err);
                    if !is_idempotent(&method)
                        || !err.is_transient()
                        || attempt >= self.throttle.max_retries()
                    {
                        return Err(err);
                    }
                    warn!(method = %method, url = %url, error = %err, "retrying request");
                    None
                }
            };

            attempt += 1;
            tokio::time::sleep(self.throttle.retry_delay(attempt, retry_after)).await;
        }
    }

    async fn parse_json<T>(response: Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            response.json::<T>().await.map_err(ApiError::from)
        } else {
            Err(Self::failure(response).await)
        }
    }

    async fn ensure_success(response: Response) -> Result<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::failure(response).await)
        }
    }

    async fn failure(response: Response) -> ApiError {
        let status = response.status();
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ApiError::Authentication(format!("Access denied ({}) - {}", status, body))
            }
            StatusCode::NOT_FOUND => ApiError::NotFound(url),
            _ => build_http_error(status, &body),
        }
    }
}

fn build_http_client(config: &ClientConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();

    if let Some(auth) = config.auth.header_value() {
        let mut value = header_value(auth)?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    headers.insert(USER_AGENT, header_value(config.user_agent.clone())?);

    for (name, value) in &config.extra_headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ApiError::Other(err.to_string()))?;
        headers.insert(header_name, header_value(value.clone())?);
    }

    Client::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|err| ApiError::Other(err.to_string()))
}

fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET || *method == Method::PUT || *method == Method::DELETE
}

/// POST and PATCH may already have taken effect on a server error, so they
/// are only repeated when the server refused them outright.
fn retryable_status(method: &Method, status: StatusCode) -> bool {
    if is_idempotent(method) {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    } else {
        status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
    }
}

fn header_value(value: String) -> Result<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|err| ApiError::Other(err.to_string()))
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn build_http_error(status: StatusCode, body: &str) -> ApiError {
    let code = extract_error_code(body);
    ApiError::http(status, code, body.to_string())
}

/// Pulls the vendor error identifier out of a JSON error body. Jira reports
/// `errorMessages`, Harvest `error`, SendGrid `errors[].message`.
fn extract_error_code(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    let as_string = |v: &Value| v.as_str().map(|s| s.to_string());
    value
        .get("code")
        .and_then(as_string)
        .or_else(|| value.get("error").and_then(as_string))
        .or_else(|| {
            value
                .get("errorMessages")
                .and_then(|messages| messages.get(0))
                .and_then(as_string)
        })
        .or_else(|| {
            value
                .get("errors")
                .and_then(|errors| errors.get(0))
                .and_then(|first| first.get("message"))
                .and_then(as_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Auth;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: u32,
    }

    fn client_for(server: &mockito::Server) -> HttpClient {
        let config = ClientConfig::new(server.url(), Auth::Bearer("t0ken".into()))
            .with_cooldown(Duration::ZERO)
            .with_retries(2, Duration::from_millis(5));
        HttpClient::new(config).expect("client builds")
    }

    #[test]
    fn error_code_is_read_from_known_vendor_shapes() {
        assert_eq!(
            extract_error_code(r#"{"errorMessages":["Issue does not exist"],"errors":{}}"#)
                .as_deref(),
            Some("Issue does not exist")
        );
        assert_eq!(
            extract_error_code(r#"{"error":"invalid_token"}"#).as_deref(),
            Some("invalid_token")
        );
        assert_eq!(
            extract_error_code(r#"{"errors":[{"message":"bad from"}]}"#).as_deref(),
            Some("bad from")
        );
        assert!(extract_error_code("<html>").is_none());
    }

    #[tokio::test]
    async fn get_sends_bearer_token_and_decodes_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/thing")
            .match_header("authorization", "Bearer t0ken")
            .with_status(200)
            .with_body(r#"{"value": 7}"#)
            .create_async()
            .await;

        let payload: Payload = client_for(&server).get("thing").await.expect("ok");
        assert_eq!(payload.value, 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .with_body("unavailable")
            .expect(3)
            .create_async()
            .await;

        let result: Result<Payload> = client_for(&server).get("flaky").await;
        match result {
            Err(ApiError::Http { status, .. }) => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
            other => panic!("unexpected result: {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_post_is_sent_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/worklog")
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let result: Result<Payload> = client_for(&server)
            .post("worklog", &serde_json::json!({"timeSpentSeconds": 3600}))
            .await;
        assert!(matches!(result, Err(ApiError::Http { .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limited_post_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/mail")
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let result: Result<Payload> = client_for(&server).post("mail", &serde_json::json!({})).await;
        assert!(result.is_err());
        mock.assert_async().await;
    }

    #[test]
    fn only_idempotent_methods_retry_server_errors() {
        assert!(retryable_status(&Method::PUT, StatusCode::BAD_GATEWAY));
        assert!(!retryable_status(&Method::POST, StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!retryable_status(&Method::PATCH, StatusCode::BAD_GATEWAY));
        assert!(retryable_status(&Method::POST, StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn missing_resources_map_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let result: Result<Payload> = client_for(&server).get("missing").await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn forbidden_maps_to_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/secret")
            .with_status(403)
            .with_body("nope")
            .create_async()
            .await;

        let result = client_for(&server).delete("secret", &[]).await;
        assert!(matches!(result, Err(ApiError::Authentication(_))));
    }
}
