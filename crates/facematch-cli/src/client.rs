//! HTTP client for facematchd.
//!
//! A transport failure (refused connection, timeout) is never reported as
//! "no match": callers must show it as a processing failure.

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("processing failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service error ({status}): {message}")]
    Service { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub struct FaceMatchClient {
    base_url: String,
    http: reqwest::Client,
}

impl FaceMatchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Upload a photo and return the matched identity or "No match found".
    pub async fn recognize(&self, image: Vec<u8>, file_name: &str) -> Result<String, ClientError> {
        let part = Part::bytes(image)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))?;
        let form = Form::new().part("file", part);

        let url = format!("{}/recognize_face", self.base_url);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(url = %url, error = %err, "recognition request failed");
                ClientError::Transport(err)
            })?;
        let body = decode(response).await?;

        body.get("matched_character")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse(format!("missing matched_character in {body}")))
    }

    pub async fn status(&self) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn reload(&self) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(format!("{}/reload", self.base_url))
            .send()
            .await?;
        decode(response).await
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let is_png = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));
    if is_png {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// JSON body of a successful response; error bodies become `ClientError::Service`.
async fn decode(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    let text = response.text().await?;
    let body: Option<Value> = serde_json::from_str(&text).ok();

    if !status.is_success() {
        tracing::debug!(status = status.as_u16(), "service returned an error");
        let message = body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(text);
        return Err(ClientError::Service {
            status: status.as_u16(),
            message,
        });
    }

    body.ok_or_else(|| ClientError::InvalidResponse(format!("not JSON: {text}")))
}
