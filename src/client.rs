//! Blocking HTTP client for a running sessiond server
//!
//! Used by the CLI. Calls block; async callers run them on the blocking pool.

use crate::error::{SessiondError, SessiondResult};
use crate::session::SessionSnapshot;
use crate::tenant::TenantId;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use ureq::http::Response;
use ureq::{Agent, Body};

/// Per-request timeout; `start` may take as long as the server's start bound
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for one server base URL
#[derive(Clone)]
pub struct ApiClient {
    base: String,
    agent: Agent,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();

        Self {
            base: base.into().trim_end_matches('/').to_string(),
            agent: Agent::new_with_config(config),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, tenant: &TenantId, action: &str) -> String {
        format!("{}/sessions/{}/{}", self.base, tenant, action)
    }

    pub fn status(&self, tenant: &TenantId) -> SessiondResult<SessionSnapshot> {
        let response = self
            .agent
            .get(self.url(tenant, "status"))
            .call()
            .map_err(|e| self.transport_error(e))?;
        read(response)
    }

    pub fn start(&self, tenant: &TenantId) -> SessiondResult<SessionSnapshot> {
        let response = self
            .agent
            .post(self.url(tenant, "start"))
            .send_empty()
            .map_err(|e| self.transport_error(e))?;
        read(response)
    }

    fn transport_error(&self, err: ureq::Error) -> SessiondError {
        SessiondError::Http(format!("{}: {}", self.base, err))
    }
}

fn read<T: DeserializeOwned>(mut response: Response<Body>) -> SessiondResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .body_mut()
            .read_json::<T>()
            .map_err(|e| SessiondError::Http(format!("invalid response body: {}", e)));
    }

    let message = response
        .body_mut()
        .read_json::<ErrorBody>()
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());
    Err(SessiondError::Http(format!("server returned {}: {}", status.as_u16(), message)))
}
