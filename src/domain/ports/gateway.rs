//! Port for the remote API gateway collaborator.
//!
//! The gateway owns authentication, serialization, and raw transport. This
//! layer treats it as an opaque, retryable, possibly-failing function from
//! requests to responses.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::GatewayError;
use crate::domain::models::TenantId;

/// HTTP-ish method of a gateway request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether re-issuing a request with this method is safe.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Get | Self::Put | Self::Delete)
    }
}

/// One request to the remote API, with the tenant context threaded
/// explicitly per call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub tenant: TenantId,
}

impl ApiRequest {
    pub fn get(tenant: &TenantId, path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            tenant: tenant.clone(),
        }
    }

    pub fn post(tenant: &TenantId, path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            tenant: tenant.clone(),
        }
    }

    pub fn put(tenant: &TenantId, path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            tenant: tenant.clone(),
        }
    }

    pub fn delete(tenant: &TenantId, path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            query: Vec::new(),
            body: None,
            tenant: tenant.clone(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Circuit breaker key for this request: method plus the leading path
    /// segment naming the resource family. Instance ids are deliberately
    /// excluded so faults across resources of one family trip one breaker
    /// and the breaker table stays bounded by family count.
    pub fn operation_key(&self) -> String {
        let family = self
            .path
            .split('/')
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        format!("{} /{family}", self.method.as_str())
    }
}

/// Response from the remote API.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// Remote API gateway collaborator.
#[async_trait]
pub trait ApiGateway: Send + Sync {
    async fn request(&self, req: ApiRequest) -> Result<ApiResponse, GatewayError>;
}
