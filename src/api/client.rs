//! HTTP client for the release backend.
//!
//! A single request pipeline: attach the bearer token for requests that
//! require it, route "public" requests to the public API host, and turn
//! every non-2xx response into a uniform [`ShipitError::Api`].

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info_span, warn};

use crate::auth::{AuthError, Session};
use crate::config::AppConfig;
use crate::error::{Result, ShipitError};
use crate::telemetry::new_request_id;

const USER_AGENT: &str = concat!("shipit-admin/", env!("CARGO_PKG_VERSION"));

/// Per-request routing and authentication flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub auth_required: bool,
    pub public: bool,
}

impl RequestOptions {
    /// Authenticated request against the admin API.
    pub const AUTH: Self = Self {
        auth_required: true,
        public: false,
    };

    /// Anonymous request against the public API.
    pub const PUBLIC: Self = Self {
        auth_required: false,
        public: true,
    };

    /// Anonymous request against the admin API.
    pub const ANONYMOUS: Self = Self {
        auth_required: false,
        public: false,
    };
}

/// Release backend API client
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    public_api_url: String,
    session: Option<Arc<Session>>,
}

impl ApiClient {
    pub fn new(api_url: impl Into<String>, public_api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            public_api_url: public_api_url.into().trim_end_matches('/').to_string(),
            session: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let client = Self::new(config.api_url.clone(), config.public_api_url.clone());
        match Session::from_config(config) {
            Some(session) => client.with_session(Arc::new(session)),
            None => client,
        }
    }

    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Resolve a path against the admin or public base URL.
    ///
    /// Absolute URLs are passed through untouched.
    pub fn url(&self, path: &str, options: RequestOptions) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = if options.public {
            &self.public_api_url
        } else {
            &self.api_url
        };
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        self.request(Method::GET, path, options, |b| b).await
    }

    pub async fn get_with_query<T, Q>(
        &self,
        path: &str,
        query: &Q,
        options: RequestOptions,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.request(Method::GET, path, options, |b| b.query(query))
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, options, |b| b.json(body))
            .await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, options, |b| b.json(body))
            .await
    }

    pub async fn delete<T, Q>(&self, path: &str, query: &Q, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.request(Method::DELETE, path, options, |b| b.query(query))
            .await
    }

    /// Check that the backend is reachable.
    pub async fn heartbeat(&self) -> Result<()> {
        let response = self
            .send(Method::GET, "/__heartbeat__", RequestOptions::ANONYMOUS, |b| b)
            .await?;
        check_status(response).await.map(|_| ())
    }

    async fn request<T, F>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
        customize: F,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let response = self.send(method, path, options, customize).await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        // Some mutating endpoints answer with an empty body.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_str("null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send<F>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
        customize: F,
    ) -> Result<Response>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path, options);
        let request_id = new_request_id();
        let span = info_span!("shipit_request", %method, %url, request_id = %request_id);

        async move {
            let mut builder = self
                .http
                .request(method, &url)
                .header("User-Agent", USER_AGENT)
                .header("Accept", "application/json")
                .header("X-Request-Id", &request_id);

            if options.auth_required {
                let session = self.session.as_ref().ok_or(AuthError::MissingCredentials)?;
                let token = session.bearer_token().await?;
                builder = builder.bearer_auth(token);
            }

            let response = customize(builder).send().await?;
            debug!(status = response.status().as_u16(), "Received response");
            Ok::<_, ShipitError>(response)
        }
        .instrument(span)
        .await
    }
}

/// Pass successful responses through; normalize failures into `ShipitError::Api`.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = ShipitError::from_response(status.as_u16(), &body);
    warn!(status = status.as_u16(), error = %error, "Backend request failed");
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_routing() {
        let client = ApiClient::new("https://admin.example/", "https://public.example");
        assert_eq!(
            client.url("/releases", RequestOptions::AUTH),
            "https://admin.example/releases"
        );
        assert_eq!(
            client.url("releases", RequestOptions::PUBLIC),
            "https://public.example/releases"
        );
        assert_eq!(
            client.url(
                "https://tc.example/api/queue/v1/task/abc/status",
                RequestOptions::PUBLIC
            ),
            "https://tc.example/api/queue/v1/task/abc/status"
        );
    }
}
