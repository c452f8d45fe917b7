//! Model → provider routing.
//!
//! Every supported model is served by one of three OpenAI-compatible
//! providers. The model id prefix picks the provider, which in turn fixes
//! the storage key holding its API key and the endpoint to post to.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Deepseek,
    Qwen,
    Hunyuan,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Deepseek, Provider::Qwen, Provider::Hunyuan];

    pub fn id(&self) -> &'static str {
        match self {
            Provider::Deepseek => "deepseek",
            Provider::Qwen => "qwen",
            Provider::Hunyuan => "hunyuan",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Deepseek => "Deepseek",
            Provider::Qwen => "Qwen",
            Provider::Hunyuan => "Hunyuan",
        }
    }

    pub fn storage_key(&self) -> &'static str {
        match self {
            Provider::Deepseek => "apiKey_deepseek",
            Provider::Qwen => "apiKey_qwen",
            Provider::Hunyuan => "apiKey_hunyuan",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::Deepseek => "https://api.deepseek.com/chat/completions",
            Provider::Qwen => {
                "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
            }
            Provider::Hunyuan => "https://api.hunyuan.cloud.tencent.com/v1/chat/completions",
        }
    }

    /// Environment variable that overrides the endpoint.
    pub fn endpoint_env_var(&self) -> &'static str {
        match self {
            Provider::Deepseek => "STREAM_CHAT_DEEPSEEK_ENDPOINT",
            Provider::Qwen => "STREAM_CHAT_QWEN_ENDPOINT",
            Provider::Hunyuan => "STREAM_CHAT_HUNYUAN_ENDPOINT",
        }
    }

    /// Provider whose prefix `model` starts with, checked in priority order.
    /// `None` means no prefix matched.
    pub fn for_model(model: &str) -> Option<Provider> {
        if model.starts_with("qwen") || model.starts_with("qwq") {
            Some(Provider::Qwen)
        } else if model.starts_with("deepseek") {
            Some(Provider::Deepseek)
        } else if model.starts_with("hunyuan") {
            Some(Provider::Hunyuan)
        } else {
            None
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| anyhow!("Unknown provider: {}", s))
    }
}

/// Where a model's requests go and which stored key authorizes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEndpointBinding {
    pub provider: Provider,
    pub storage_key: &'static str,
    pub endpoint: String,
    /// Set when the model matched no prefix and was routed to Deepseek.
    pub fallback: bool,
}

/// Endpoint per provider. Fixed at startup; defaults can be overridden from
/// the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTable {
    deepseek: String,
    qwen: String,
    hunyuan: String,
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self {
            deepseek: Provider::Deepseek.default_endpoint().to_string(),
            qwen: Provider::Qwen.default_endpoint().to_string(),
            hunyuan: Provider::Hunyuan.default_endpoint().to_string(),
        }
    }
}

impl EndpointTable {
    /// Defaults, with any `STREAM_CHAT_*_ENDPOINT` variables applied.
    pub fn from_env() -> Result<Self> {
        let mut table = Self::default();
        for provider in Provider::ALL {
            if let Ok(value) = std::env::var(provider.endpoint_env_var()) {
                if value.trim().is_empty() {
                    continue;
                }
                table = table
                    .with_endpoint(provider, &value)
                    .with_context(|| format!("invalid {}", provider.endpoint_env_var()))?;
                tracing::info!(%provider, endpoint = %value.trim(), "endpoint overridden");
            }
        }
        Ok(table)
    }

    /// Replace one provider's endpoint. The value must be an http(s) URL.
    pub fn with_endpoint(mut self, provider: Provider, endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("unsupported scheme {:?} in {}", url.scheme(), url));
        }
        let slot = match provider {
            Provider::Deepseek => &mut self.deepseek,
            Provider::Qwen => &mut self.qwen,
            Provider::Hunyuan => &mut self.hunyuan,
        };
        *slot = url.to_string();
        Ok(self)
    }

    pub fn endpoint(&self, provider: Provider) -> &str {
        match provider {
            Provider::Deepseek => &self.deepseek,
            Provider::Qwen => &self.qwen,
            Provider::Hunyuan => &self.hunyuan,
        }
    }

    /// Resolve a model id. Unmatched ids fall back to Deepseek; the binding
    /// records that so callers can tell the two apart.
    pub fn resolve(&self, model: &str) -> ModelEndpointBinding {
        let (provider, fallback) = match Provider::for_model(model) {
            Some(p) => (p, false),
            None => {
                tracing::warn!(model, "model matches no provider prefix, routing to Deepseek");
                (Provider::Deepseek, true)
            }
        };
        ModelEndpointBinding {
            provider,
            storage_key: provider.storage_key(),
            endpoint: self.endpoint(provider).to_string(),
            fallback,
        }
    }
}
