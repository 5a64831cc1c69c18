//! Model-selection tokens.
//!
//! A token is `"<provider>/<model>"` for built-in providers or
//! `"custom/<providerId>/<model>"` for user-registered endpoints. Model names
//! may themselves contain slashes (`models/gemini-1.5-pro`), so only the
//! leading segments are split off.

use std::fmt;

const CUSTOM_PREFIX: &str = "custom/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelToken {
    Builtin { provider: String, model: String },
    Custom { provider_id: String, model: String },
}

impl ModelToken {
    /// Parse a selection. A blank token means nothing is selected.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        if let Some(rest) = token.strip_prefix(CUSTOM_PREFIX) {
            let (provider_id, model) = rest.split_once('/').unwrap_or((rest, ""));
            return Some(ModelToken::Custom {
                provider_id: provider_id.to_string(),
                model: model.to_string(),
            });
        }

        let (provider, model) = token.split_once('/').unwrap_or((token, ""));
        Some(ModelToken::Builtin {
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }

    pub fn builtin(provider: impl Into<String>, model: impl Into<String>) -> Self {
        ModelToken::Builtin {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn custom(provider_id: impl Into<String>, model: impl Into<String>) -> Self {
        ModelToken::Custom {
            provider_id: provider_id.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ModelToken::Builtin { model, .. } | ModelToken::Custom { model, .. } => model,
        }
    }
}

impl fmt::Display for ModelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelToken::Builtin { provider, model } => write!(f, "{provider}/{model}"),
            ModelToken::Custom { provider_id, model } => {
                write!(f, "{CUSTOM_PREFIX}{provider_id}/{model}")
            }
        }
    }
}
