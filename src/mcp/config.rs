use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use url::Url;

use crate::error::{AgentError, Result};

/// Connection parameters for the remote MCP tool server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct McpEndpointConfig {
    /// Streamable HTTP endpoint, e.g. `http://localhost:8000/mcp`.
    pub url: String,
    /// Deadline for a single request/response round trip.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra HTTP headers; values may contain `${VAR}` placeholders.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl McpEndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout_secs: default_request_timeout_secs(),
            headers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse and validate the endpoint URL.
    pub fn parsed_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| AgentError::transport(format!("invalid URL '{}': {e}", self.url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AgentError::transport(format!(
                "unsupported URL scheme '{other}' for MCP endpoint"
            ))),
        }
    }

    /// Headers with `${VAR}` placeholders expanded.
    pub fn resolved_headers(&self) -> HashMap<String, String> {
        expand_env_map(&self.headers)
    }
}

/// Expand "${VAR}" placeholders from the process environment.
/// Missing variables leave the placeholder unchanged.
pub fn expand_env_placeholders(input: &str) -> String {
    let mut out = input.to_string();
    for (k, v) in std::env::vars() {
        let needle = format!("${{{k}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, &v);
        }
    }
    out
}

pub fn expand_env_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_placeholders(v)))
        .collect()
}
