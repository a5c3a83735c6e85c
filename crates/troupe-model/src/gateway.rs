// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::bail;
use tracing::warn;

use troupe_config::ProvidersFile;

use crate::openai_compat::AuthStyle;
use crate::{
    AnthropicProvider, GeminiProvider, MockProvider, ModelProvider, OpenAICompatProvider,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Resolves `(provider_id, model_name)` pairs from an agent's configuration
/// to a concrete driver.  This is the only place that knows provider flavor.
pub struct ProviderGateway {
    providers: ProvidersFile,
}

impl ProviderGateway {
    pub fn new(providers: ProvidersFile) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &ProvidersFile {
        &self.providers
    }

    /// Build a driver for the given provider id and model name.
    ///
    /// An unknown provider id falls back to the first configured provider
    /// with a warning; an empty model name falls back to the provider's
    /// first listed model.  A configuration with no providers at all is a
    /// hard error.
    pub fn resolve(
        &self,
        provider_id: &str,
        model_name: &str,
    ) -> anyhow::Result<Box<dyn ModelProvider>> {
        let cfg = match self.providers.get(provider_id) {
            Some(p) => p,
            None => {
                let Some(first) = self.providers.first() else {
                    bail!("no model providers configured; add one to llm_providers.json");
                };
                if !provider_id.is_empty() {
                    warn!(
                        provider_id,
                        fallback = %first.id,
                        "provider not found; falling back to first configured provider"
                    );
                }
                first
            }
        };

        let model = if model_name.is_empty() {
            let Some(default) = cfg.models.first() else {
                bail!("provider {:?} lists no models and agent named none", cfg.id);
            };
            warn!(provider = %cfg.id, model = %default, "agent has no model name; using provider default");
            default.clone()
        } else {
            model_name.to_string()
        };

        let key = resolve_api_key(&cfg.api_key_env);

        match cfg.kind.as_str() {
            "openai" => Ok(Box::new(OpenAICompatProvider::new(
                cfg.id.clone(),
                model,
                key,
                cfg.base_url.as_deref().unwrap_or(OPENAI_BASE_URL),
                vec![],
                AuthStyle::Bearer,
            ))),
            "openai_compatible" => {
                let Some(base) = cfg.base_url.as_deref() else {
                    bail!("provider {:?} is openai_compatible but has no base_url", cfg.id);
                };
                // Open-routing relays require identifying headers before
                // they will serve free-tier models.
                let extra_headers = if base.contains("openrouter.ai") {
                    vec![
                        ("HTTP-Referer".to_string(), "https://github.com/troupe-ai/troupe".to_string()),
                        ("X-Title".to_string(), "troupe".to_string()),
                    ]
                } else {
                    vec![]
                };
                let auth_style = if key.is_some() { AuthStyle::Bearer } else { AuthStyle::None };
                Ok(Box::new(OpenAICompatProvider::new(
                    cfg.id.clone(),
                    model,
                    key,
                    base,
                    extra_headers,
                    auth_style,
                )))
            }
            "anthropic" => Ok(Box::new(AnthropicProvider::new(
                model,
                key,
                cfg.base_url.clone(),
            ))),
            "gemini" => Ok(Box::new(GeminiProvider::new(
                model,
                key,
                cfg.base_url.clone(),
            ))),
            "mock" => Ok(Box::new(MockProvider)),
            other => {
                bail!(
                    "unknown provider type {other:?} for provider {:?}; \
                     known types: openai, openai_compatible, anthropic, gemini, mock",
                    cfg.id
                )
            }
        }
    }
}

/// Resolve the credential named by `api_key_env`.
///
/// A value that already looks like a literal key (`sk-` prefix or very
/// long) is used verbatim — users paste keys directly into local configs.
/// The `"EMPTY"` marker and unset env vars resolve to no credential.
fn resolve_api_key(api_key_env: &str) -> Option<String> {
    if api_key_env.is_empty() || api_key_env == "EMPTY" {
        return None;
    }
    if api_key_env.starts_with("sk-") || api_key_env.len() > 40 {
        return Some(api_key_env.to_string());
    }
    std::env::var(api_key_env).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn providers(json: &str) -> ProvidersFile {
        serde_json::from_str(json).unwrap()
    }

    fn two_provider_gateway() -> ProviderGateway {
        ProviderGateway::new(providers(
            r#"{"providers":[
                {"id":"or1","type":"openai_compatible","name":"OpenRouter",
                 "models":["z-ai/glm-4.5-air:free"],
                 "base_url":"https://openrouter.ai/api/v1"},
                {"id":"anthro","type":"anthropic","name":"Anthropic",
                 "models":["claude-opus-4-5"]}
            ]}"#,
        ))
    }

    #[test]
    fn resolves_configured_provider() {
        let gw = two_provider_gateway();
        let p = gw.resolve("anthro", "claude-opus-4-5").unwrap();
        assert_eq!(p.name(), "anthropic");
        assert_eq!(p.model_name(), "claude-opus-4-5");
    }

    #[test]
    fn unknown_provider_falls_back_to_first() {
        let gw = two_provider_gateway();
        let p = gw.resolve("deleted_provider", "some-model").unwrap();
        assert_eq!(p.name(), "or1");
    }

    #[test]
    fn empty_model_uses_provider_default() {
        let gw = two_provider_gateway();
        let p = gw.resolve("or1", "").unwrap();
        assert_eq!(p.model_name(), "z-ai/glm-4.5-air:free");
    }

    #[test]
    fn no_providers_is_an_error() {
        let gw = ProviderGateway::new(ProvidersFile::default());
        let err = gw.resolve("any", "m").err().unwrap().to_string();
        assert!(err.contains("no model providers configured"));
    }

    #[test]
    fn openai_compatible_without_base_url_is_an_error() {
        let gw = ProviderGateway::new(providers(
            r#"{"providers":[{"id":"x","type":"openai_compatible","name":"X"}]}"#,
        ));
        assert!(gw.resolve("x", "m").is_err());
    }

    #[test]
    fn unknown_provider_type_lists_known_types() {
        let gw = ProviderGateway::new(providers(
            r#"{"providers":[{"id":"x","type":"carrier_pigeon","name":"X"}]}"#,
        ));
        let err = gw.resolve("x", "m").err().unwrap().to_string();
        assert!(err.contains("carrier_pigeon"));
        assert!(err.contains("anthropic"));
    }

    #[test]
    fn mock_provider_type_resolves() {
        let gw = ProviderGateway::new(providers(
            r#"{"providers":[{"id":"m","type":"mock","name":"Mock","models":["mock-model"]}]}"#,
        ));
        assert_eq!(gw.resolve("m", "mock-model").unwrap().name(), "mock");
    }

    #[test]
    fn literal_key_is_used_verbatim() {
        assert_eq!(resolve_api_key("sk-abc123").as_deref(), Some("sk-abc123"));
        assert!(resolve_api_key("EMPTY").is_none());
        assert!(resolve_api_key("").is_none());
        assert!(resolve_api_key("UNSET_VAR_FOR_TROUPE_TESTS_XYZ").is_none());
    }
}
