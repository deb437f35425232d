use serde::{Deserialize, Serialize};

/// Upstream provider family. `Other` carries whatever label the caller
/// declared when none of the known prefixes match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
    Google,
    Other(String),
}

impl Provider {
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Other(s) => s,
        }
    }
}

/// A short model label plus its resolved provider family and canonical
/// model name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmIdentity {
    pub label: String,
    pub provider: Option<Provider>,
    pub model_name: String,
}

impl LlmIdentity {
    /// Resolves a bare label (`"gpt-4o-mini"`) or a `provider/model`
    /// label into an [`LlmIdentity`], declared provider taking precedence
    /// over inference.
    pub fn resolve(label: impl Into<String>, declared_provider: Option<Provider>) -> Self {
        let label = label.into();
        if let Some(provider) = declared_provider {
            return LlmIdentity {
                model_name: label.clone(),
                label,
                provider: Some(provider),
            };
        }
        if let Some((prefix, rest)) = label.split_once('/') {
            return LlmIdentity {
                label: label.clone(),
                provider: Some(parse_provider_name(prefix)),
                model_name: rest.to_string(),
            };
        }
        let provider = guess_provider(&label);
        LlmIdentity {
            model_name: label.clone(),
            label,
            provider,
        }
    }
}

fn parse_provider_name(name: &str) -> Provider {
    match name {
        "openai" => Provider::Openai,
        "anthropic" => Provider::Anthropic,
        "google" => Provider::Google,
        other => Provider::Other(other.to_string()),
    }
}

const OPENAI_PREFIXES: &[&str] = &["gpt-", "o1-", "o3-", "o4-", "chatgpt"];
const OPENAI_EXACT: &[&str] = &["o1", "o3", "o4"];
const ANTHROPIC_PREFIXES: &[&str] = &["claude-"];
const GOOGLE_PREFIXES: &[&str] = &["gemini-"];

/// Infers a provider family from a bare model label by prefix, mirroring
/// the rules the rest of the ecosystem already uses for these model
/// families. Returns `None` when nothing matches; callers then fall back
/// to treating the label as an opaque, provider-less identity.
pub fn guess_provider(label: &str) -> Option<Provider> {
    if OPENAI_EXACT.contains(&label) || OPENAI_PREFIXES.iter().any(|p| label.starts_with(p)) {
        return Some(Provider::Openai);
    }
    if ANTHROPIC_PREFIXES.iter().any(|p| label.starts_with(p)) {
        return Some(Provider::Anthropic);
    }
    if GOOGLE_PREFIXES.iter().any(|p| label.starts_with(p)) {
        return Some(Provider::Google);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_openai_by_prefix() {
        assert_eq!(guess_provider("gpt-4o-mini"), Some(Provider::Openai));
        assert_eq!(guess_provider("o3"), Some(Provider::Openai));
        assert_eq!(guess_provider("chatgpt-4o-latest"), Some(Provider::Openai));
    }

    #[test]
    fn infers_anthropic_and_google() {
        assert_eq!(
            guess_provider("claude-sonnet-4-5"),
            Some(Provider::Anthropic)
        );
        assert_eq!(guess_provider("gemini-2.5-pro"), Some(Provider::Google));
    }

    #[test]
    fn unknown_label_has_no_provider() {
        assert_eq!(guess_provider("mystery-model"), None);
    }

    #[test]
    fn slash_form_is_honored_verbatim() {
        let id = LlmIdentity::resolve("openai/gpt-4o-mini", None);
        assert_eq!(id.provider, Some(Provider::Openai));
        assert_eq!(id.model_name, "gpt-4o-mini");
    }

    #[test]
    fn declared_provider_overrides_inference() {
        let id = LlmIdentity::resolve("claude-sonnet-4-5", Some(Provider::Other("custom".into())));
        assert_eq!(id.provider, Some(Provider::Other("custom".into())));
    }
}
