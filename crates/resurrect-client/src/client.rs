//! Control-API client and the `ControlApi` seam used by the watchdog.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::de::DeserializeOwned;
use tracing::debug;

use resurrect_core::{
    ConfigError, DaemonConfig, DaemonConfigs, ProxySnapshot, RootResponse, SelectionUpdate,
};

use crate::error::{ClientError, ClientResult};

/// Operations the reconciliation loop needs from the proxy daemon.
pub trait ControlApi: Send + Sync {
    /// `GET /`; succeeds only if `hello` matches the expected sentinel.
    fn probe_health(&self) -> impl Future<Output = ClientResult<()>> + Send;

    /// `GET /proxies`.
    fn list_proxies(&self) -> impl Future<Output = ClientResult<ProxySnapshot>> + Send;

    /// `PUT /proxies/{group}` so that `group`'s active child becomes `child`.
    fn set_selection(
        &self,
        group: &str,
        child: &str,
    ) -> impl Future<Output = ClientResult<()>> + Send;
}

/// HTTP client for a single proxy daemon.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    /// `host:port`, bracketed for IPv6 literals.
    authority: String,
    secret: Option<String>,
    sentinel: String,
    timeout: Duration,
}

impl DaemonClient {
    /// Create a client for `host:port` expecting the default `clash` sentinel.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        Self {
            authority,
            secret: None,
            sentinel: "clash".to_string(),
            timeout,
        }
    }

    /// Build a client from the `[daemon]` config table.
    pub fn from_config(config: &DaemonConfig) -> Result<Self, ConfigError> {
        let client = Self::new(&config.host, config.port, config.timeout()?)
            .with_sentinel(&config.sentinel);
        Ok(match &config.secret {
            Some(secret) => client.with_secret(secret),
            None => client,
        })
    }

    /// Send `Authorization: Bearer <secret>` on every request.
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    pub fn with_sentinel(mut self, sentinel: &str) -> Self {
        self.sentinel = sentinel.to_string();
        self
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `GET /configs`.
    pub async fn get_configs(&self) -> ClientResult<DaemonConfigs> {
        self.get_json("/configs").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let (status, body) = self.send(Method::GET, path, None).await?;
        if !status.is_success() {
            return Err(rejected(path, status, &body));
        }
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Issue one request on a fresh connection, bounded by `self.timeout`.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ClientResult<(StatusCode, Bytes)> {
        let exchange = async {
            let stream = tokio::net::TcpStream::connect(&self.authority)
                .await
                .map_err(|e| {
                    ClientError::Unreachable(format!("connect {}: {e}", self.authority))
                })?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| ClientError::Unreachable(format!("handshake: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let mut builder = http::Request::builder()
                .method(method.clone())
                .uri(path)
                .header(HOST, &self.authority)
                .header(USER_AGENT, concat!("clash-resurrect/", env!("CARGO_PKG_VERSION")));
            if let Some(secret) = &self.secret {
                builder = builder.header(AUTHORIZATION, format!("Bearer {secret}"));
            }
            let req = match body {
                Some(bytes) => builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(Full::new(Bytes::from(bytes))),
                None => builder.body(Full::new(Bytes::new())),
            }
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| ClientError::Unreachable(format!("{method} {path}: {e}")))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| ClientError::Unreachable(format!("reading {path}: {e}")))?
                .to_bytes();

            debug!(%method, %path, %status, bytes = body.len(), "control api response");
            Ok::<_, ClientError>((status, body))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Unreachable(format!(
                "{path} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

impl ControlApi for DaemonClient {
    async fn probe_health(&self) -> ClientResult<()> {
        let (status, body) = self.send(Method::GET, "/", None).await?;
        let unexpected = |actual: String| ClientError::Unexpected {
            expected: self.sentinel.clone(),
            actual,
        };
        if !status.is_success() {
            return Err(unexpected(format!("status {status}")));
        }
        let root: RootResponse = serde_json::from_slice(&body)
            .map_err(|e| unexpected(format!("malformed body ({e})")))?;
        if root.hello != self.sentinel {
            return Err(unexpected(format!("hello={:?}", root.hello)));
        }
        Ok(())
    }

    async fn list_proxies(&self) -> ClientResult<ProxySnapshot> {
        self.get_json("/proxies").await
    }

    async fn set_selection(&self, group: &str, child: &str) -> ClientResult<()> {
        let path = format!("/proxies/{}", urlencoding::encode(group));
        let body = serde_json::to_vec(&SelectionUpdate {
            name: child.to_string(),
        })
        .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        let (status, resp_body) = self.send(Method::PUT, &path, Some(body)).await?;
        if !status.is_success() {
            return Err(rejected(&path, status, &resp_body));
        }
        Ok(())
    }
}

fn rejected(path: &str, status: StatusCode, body: &[u8]) -> ClientError {
    let text: String = String::from_utf8_lossy(body).trim().chars().take(256).collect();
    ClientError::Rejected {
        path: path.to_string(),
        status,
        body: text,
    }
}
