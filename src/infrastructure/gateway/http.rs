//! HTTP implementation of the API gateway port.
//!
//! Owns connection pooling, client-side rate limiting, tenant header
//! injection, and status-to-error mapping. Retry, caching, and circuit
//! breaking all live above this layer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client as ReqwestClient;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::errors::GatewayError;
use crate::domain::models::GatewayConfig;
use crate::domain::ports::{ApiGateway, ApiRequest, ApiResponse, Method};

/// Tenant context header understood by the remote API.
const TENANT_HEADER: &str = "x-account-context";

pub struct HttpGateway {
    http: ReqwestClient,
    base_url: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        let rps = NonZeroU32::new(config.requests_per_second.max(1))
            .context("requests_per_second must be positive")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }
}

#[async_trait]
impl ApiGateway for HttpGateway {
    #[instrument(skip(self, req), fields(method = req.method.as_str(), path = %req.path))]
    async fn request(&self, req: ApiRequest) -> Result<ApiResponse, GatewayError> {
        self.limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = match req.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
            Method::Delete => self.http.delete(&url),
        };
        builder = builder
            .query(&req.query)
            .header(TENANT_HEADER, req.tenant.to_string());
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Network(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        debug!(status, "gateway response");

        if (200..300).contains(&status) {
            Ok(ApiResponse { status, body })
        } else {
            Err(GatewayError::from_status(status, body))
        }
    }
}
