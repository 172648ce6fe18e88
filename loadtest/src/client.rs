//! HTTP client wrapper used by virtual users
//!
//! Transport failures never surface as errors here: they are folded into an
//! [`HttpOutcome`] without a status so the caller's checks simply fail.

use std::str::FromStr;
use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;

/// Wire encoding of the request payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    /// `application/x-www-form-urlencoded`
    #[default]
    Form,
    /// `application/json`
    Json,
}

impl FromStr for BodyEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "form" => Ok(BodyEncoding::Form),
            "json" => Ok(BodyEncoding::Json),
            other => Err(format!("expected 'form' or 'json', got '{}'", other)),
        }
    }
}

/// Result of a single request
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    /// Response status, absent when the request never got a response
    pub status: Option<StatusCode>,
    /// Time from send until the body was consumed (or the failure)
    pub latency: Duration,
    /// Response body bytes read
    pub bytes_received: u64,
    /// Retained body, only when bodies are not discarded
    pub body: Option<Vec<u8>>,
    /// Transport error description
    pub error: Option<String>,
}

impl HttpOutcome {
    /// Status as a plain number, 0 when there was no response
    pub fn status_code(&self) -> u16 {
        self.status.map(|s| s.as_u16()).unwrap_or(0)
    }

    /// Whether the request counts as failed in HTTP statistics
    ///
    /// Anything without a response, or outside 200-399, is failed.
    pub fn is_failed(&self) -> bool {
        match self.status {
            Some(status) => !(200..400).contains(&status.as_u16()),
            None => true,
        }
    }
}

/// Shared, pooled HTTP client for all virtual users
#[derive(Debug, Clone)]
pub struct LoadClient {
    inner: Client,
    discard_response_bodies: bool,
}

impl LoadClient {
    /// Build a client with the given request timeout
    pub fn new(request_timeout: Duration, discard_response_bodies: bool) -> reqwest::Result<Self> {
        let inner = Client::builder()
            .pool_max_idle_per_host(200)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            inner,
            discard_response_bodies,
        })
    }

    /// POST `payload` to `url` and wait for the full response
    pub async fn post<T>(&self, url: &str, payload: &T, encoding: BodyEncoding) -> HttpOutcome
    where
        T: Serialize + ?Sized,
    {
        let request = self.inner.post(url);
        let request = match encoding {
            BodyEncoding::Form => request.form(payload),
            BodyEncoding::Json => request.json(payload),
        };

        let start = Instant::now();
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                match self.read_body(resp).await {
                    Ok((bytes_received, body)) => HttpOutcome {
                        status: Some(status),
                        latency: start.elapsed(),
                        bytes_received,
                        body,
                        error: None,
                    },
                    // The status line arrived; a broken body still has a status
                    Err(e) => HttpOutcome {
                        status: Some(status),
                        latency: start.elapsed(),
                        bytes_received: 0,
                        body: None,
                        error: Some(e.to_string()),
                    },
                }
            }
            Err(e) => HttpOutcome {
                status: None,
                latency: start.elapsed(),
                bytes_received: 0,
                body: None,
                error: Some(e.to_string()),
            },
        }
    }

    async fn read_body(&self, mut resp: Response) -> reqwest::Result<(u64, Option<Vec<u8>>)> {
        if self.discard_response_bodies {
            let mut total = 0u64;
            while let Some(chunk) = resp.chunk().await? {
                total += chunk.len() as u64;
            }
            Ok((total, None))
        } else {
            let bytes = resp.bytes().await?;
            Ok((bytes.len() as u64, Some(bytes.to_vec())))
        }
    }
}
