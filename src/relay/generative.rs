//! Generative text relay.
//!
//! # Responsibilities
//! - Accept `{ "text": ... }` from the frontend (JSON or url-encoded form)
//! - Wrap it in the generative API's `contents` envelope and POST it
//! - Hand the parsed JSON back, relaying any `Set-Cookie`
//!
//! # Design Decisions
//! - Separate client from the backend relay; redirects followed, no system proxy
//! - The API key travels as a query parameter and is never logged
//! - Every failure collapses into one client-facing message

use std::time::Duration;

use axum::{
    extract::{FromRequest, Request},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::http::request::is_form_urlencoded;
use crate::http::response::{failure, GENERATIVE_FAILURE_MESSAGE};

/// Inbound body of a generative request.
#[derive(Debug, Default, Deserialize)]
pub struct GenerativeRequest {
    #[serde(default)]
    pub text: String,
}

/// Error type for generative relay operations.
#[derive(Debug, Error)]
pub enum GenerativeError {
    #[error("generative endpoint is not configured")]
    NotConfigured,

    #[error("generative endpoint did not answer within {0:?}")]
    Timeout(Duration),

    #[error("generative transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generative endpoint returned {0}")]
    Status(StatusCode),
}

impl IntoResponse for GenerativeError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Generative relay failed");
        failure(StatusCode::INTERNAL_SERVER_ERROR, GENERATIVE_FAILURE_MESSAGE)
    }
}

/// The `contents` envelope the generative API expects.
pub fn generation_body(text: &str) -> Value {
    json!({ "contents": [{ "parts": [{ "text": text }] }] })
}

/// Text of the first candidate, if the response has one.
pub fn first_candidate_text(response: &Value) -> Option<&str> {
    response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
}

/// Relays text generation requests to the generative API.
#[derive(Debug, Clone)]
pub struct GenerativeRelay {
    client: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
}

impl GenerativeRelay {
    pub fn new(
        client: reqwest::Client,
        url: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url,
            api_key,
            timeout,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            reqwest::Client::builder().no_proxy().build()?,
            config.generative.url.clone(),
            config.generative.api_key.clone(),
            config.timeouts.upstream(),
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }

    /// Handle one `/api/gemini` request.
    pub async fn handle(&self, request: Request) -> Response {
        let text = extract_text(request).await;
        match self.generate(&text).await {
            Ok((headers, value)) => {
                tracing::debug!(
                    candidate = first_candidate_text(&value).unwrap_or_default(),
                    "Generative response"
                );
                let mut response = Json(value).into_response();
                for cookie in headers.get_all(header::SET_COOKIE) {
                    response.headers_mut().append(header::SET_COOKIE, cookie.clone());
                }
                response
            }
            Err(err) => err.into_response(),
        }
    }

    /// POST `text` to the generative API and parse the JSON answer.
    pub async fn generate(&self, text: &str) -> Result<(HeaderMap, Value), GenerativeError> {
        let (Some(url), Some(key)) = (self.url.as_deref(), self.api_key.as_deref()) else {
            return Err(GenerativeError::NotConfigured);
        };

        let exchange = async {
            let response = self
                .client
                .post(url)
                .query(&[("key", key)])
                .json(&generation_body(text))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(GenerativeError::Status(status));
            }
            let headers = response.headers().clone();
            let value = response.json::<Value>().await?;
            Ok::<_, GenerativeError>((headers, value))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| GenerativeError::Timeout(self.timeout))?
    }
}

async fn extract_text(request: Request) -> String {
    let parsed = if is_form_urlencoded(request.headers()) {
        Form::<GenerativeRequest>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|e| e.body_text())
    } else {
        Json::<GenerativeRequest>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|e| e.body_text())
    };

    match parsed {
        Ok(body) => body.text,
        Err(reason) => {
            tracing::debug!(reason = %reason, "Generative request without usable text");
            String::new()
        }
    }
}
