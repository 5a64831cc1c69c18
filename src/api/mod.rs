//! Wire payloads exchanged with the inference backend.

use crate::core::message::{Message, Role};
use crate::core::settings::{ApiKeys, CustomProvider};
use serde::{Deserialize, Serialize};

pub mod backend;

pub use backend::{Backend, BackendError, ChatByteStream, HttpBackend, UploadRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub provider: String,
    pub model: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomProviderCredentials {
    pub id: String,
    pub api_key: String,
    pub base_url: String,
}

impl From<&CustomProvider> for CustomProviderCredentials {
    fn from(provider: &CustomProvider) -> Self {
        Self {
            id: provider.id.clone(),
            api_key: provider.api_key.clone(),
            base_url: provider.base_url.clone(),
        }
    }
}

/// Body of `POST /api/list-models`. Unconfigured built-in keys are sent as
/// explicit nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListModelsRequest {
    pub google: Option<String>,
    pub openai: Option<String>,
    pub groq: Option<String>,
    pub custom_providers: Vec<CustomProviderCredentials>,
}

impl ListModelsRequest {
    pub fn new(keys: &ApiKeys, providers: &[CustomProvider]) -> Self {
        let configured = |value: &Option<String>| value.clone().filter(|key| !key.is_empty());
        Self {
            google: configured(&keys.google),
            openai: configured(&keys.openai),
            groq: configured(&keys.groq),
            custom_providers: providers.iter().map(CustomProviderCredentials::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_uses_camel_case_and_omits_missing_base_url() {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: Role::Ai,
                content: "hi".into(),
            }],
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key: "sk-test".into(),
            base_url: None,
        };

        let value = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(
            value,
            json!({
                "messages": [{"role": "ai", "content": "hi"}],
                "provider": "openai",
                "model": "gpt-4o",
                "apiKey": "sk-test"
            })
        );
    }

    #[test]
    fn list_models_request_sends_nulls_and_custom_credentials() {
        let keys = ApiKeys {
            openai: Some("sk-open".into()),
            groq: Some(String::new()),
            ..ApiKeys::default()
        };
        let providers = vec![CustomProvider {
            id: "p1".into(),
            name: "Local".into(),
            base_url: "http://localhost:1234/v1".into(),
            api_key: "local-key".into(),
            models: vec!["llama".into()],
        }];

        let value =
            serde_json::to_value(ListModelsRequest::new(&keys, &providers)).expect("serialize");
        assert_eq!(
            value,
            json!({
                "google": null,
                "openai": "sk-open",
                "groq": null,
                "custom_providers": [
                    {"id": "p1", "apiKey": "local-key", "baseUrl": "http://localhost:1234/v1"}
                ]
            })
        );
    }
}
