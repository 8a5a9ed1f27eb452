//! Model endpoints the agent can be configured for.
//!
//! Each provider differs in where its Chat Completions route lives, how the
//! API key is presented and whether `parallel_tool_calls` is accepted.

/// Default Azure `OpenAI` API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Supported LLM providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Azure `OpenAI` Service, addressed by deployment
    AzureOpenAI {
        deployment_name: String,
        api_version: String,
    },
    /// Cohere, through its `OpenAI` compatibility API
    Cohere,
    /// Any other OpenAI-compatible server (vLLM, Ollama, a local proxy)
    Generic,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use timeoff_agent::llm::Provider;
    ///
    /// assert_eq!(Provider::detect_from_url("https://api.cohere.ai"), Provider::Cohere);
    /// assert_eq!(Provider::detect_from_url("http://localhost:11434"), Provider::Generic);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("azure.com") {
            Self::AzureOpenAI {
                deployment_name: String::new(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            }
        } else if lower.contains("cohere.ai") || lower.contains("cohere.com") {
            Self::Cohere
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Whether the `parallel_tool_calls` request flag may be sent.
    #[must_use]
    pub fn supports_parallel_tools(&self) -> bool {
        !matches!(self, Self::Cohere)
    }

    /// Chat Completions URL under `base_url`.
    #[must_use]
    pub fn build_chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => format!(
                "{base}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}"
            ),
            Self::Cohere if !base.ends_with("/compatibility") => {
                format!("{base}/compatibility/v1/chat/completions")
            }
            _ => format!("{base}/v1/chat/completions"),
        }
    }

    /// Header name and value used to authenticate with `api_key`.
    #[must_use]
    pub fn auth_header(&self, api_key: &str) -> (&'static str, String) {
        match self {
            Self::AzureOpenAI { .. } => ("api-key", api_key.to_string()),
            _ => ("authorization", format!("Bearer {api_key}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection() {
        assert_eq!(Provider::detect_from_url("https://api.openai.com"), Provider::OpenAI);
        assert!(matches!(
            Provider::detect_from_url("https://my-resource.openai.azure.com"),
            Provider::AzureOpenAI { .. }
        ));
        assert_eq!(
            Provider::detect_from_url("https://api.cohere.ai/compatibility"),
            Provider::Cohere
        );
        assert_eq!(Provider::detect_from_url("https://api.groq.com/openai"), Provider::Generic);
    }

    #[test]
    fn test_parallel_tools_flag() {
        assert!(Provider::OpenAI.supports_parallel_tools());
        assert!(Provider::Generic.supports_parallel_tools());
        assert!(!Provider::Cohere.supports_parallel_tools());
    }

    #[test]
    fn test_chat_urls() {
        assert_eq!(
            Provider::OpenAI.build_chat_url("https://api.openai.com/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            Provider::Cohere.build_chat_url("https://api.cohere.ai/compatibility"),
            "https://api.cohere.ai/compatibility/v1/chat/completions"
        );
        assert_eq!(
            Provider::Cohere.build_chat_url("https://api.cohere.ai"),
            "https://api.cohere.ai/compatibility/v1/chat/completions"
        );
    }

    #[test]
    fn test_azure_url_and_auth() {
        let provider = Provider::AzureOpenAI {
            deployment_name: "gpt-4".to_string(),
            api_version: "2024-08-01-preview".to_string(),
        };
        assert_eq!(
            provider.build_chat_url("https://my-resource.openai.azure.com"),
            "https://my-resource.openai.azure.com/openai/deployments/gpt-4/chat/completions?api-version=2024-08-01-preview"
        );
        assert_eq!(provider.auth_header("k"), ("api-key", "k".to_string()));
        assert_eq!(
            Provider::OpenAI.auth_header("k"),
            ("authorization", "Bearer k".to_string())
        );
    }
}
