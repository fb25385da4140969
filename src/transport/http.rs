//! reqwest-backed transport.

use super::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default transport over a pooled `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// The timeout bounds the whole exchange including body download; per-call
    /// deadlines belong to the timeout policy, not the connection pool.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: TransportRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        let mut req = match request.method.to_uppercase().as_str() {
            "POST" => self.client.post(&request.url),
            "PUT" => self.client.put(&request.url),
            "DELETE" => self.client.delete(&request.url),
            _ => self.client.get(&request.url),
        };

        for (name, value) in &request.headers {
            req = req.header(name, value);
        }
        if !request.body.is_empty() {
            req = req.body(request.body);
        }

        let exchange = async {
            let resp = req
                .send()
                .await
                .map_err(|e| Error::Transport(TransportError::Http(e)))?;

            let status = resp.status().as_u16();
            let mut headers: std::collections::HashMap<String, Vec<String>> =
                std::collections::HashMap::new();
            for (name, value) in resp.headers() {
                if let Ok(v) = value.to_str() {
                    headers
                        .entry(name.as_str().to_ascii_lowercase())
                        .or_default()
                        .push(v.to_string());
                }
            }

            let body = resp
                .text()
                .await
                .map_err(|e| Error::Transport(TransportError::Http(e)))?;

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        };

        tokio::select! {
            result = exchange => result,
            _ = cancel.cancelled() => Err(Error::cancelled("request cancelled during transport send")),
        }
    }
}
