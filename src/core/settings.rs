//! Provider credentials and the catalog of selectable models.
//!
//! [`SettingsRegistry`] owns API keys, custom providers, and the model cache
//! fetched from the backend. Every credential change schedules a model refresh
//! in the background; refresh results are applied only if no newer refresh
//! has landed first.

use crate::api::{Backend, ListModelsRequest};
use crate::core::background::BackgroundTasks;
use crate::core::config::KeyCache;
use crate::core::ids::next_id;
use crate::core::model_token::ModelToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinProvider {
    Google,
    OpenAi,
    Groq,
}

impl BuiltinProvider {
    /// Selector order, which is also the auto-selection preference order.
    pub const ALL: [BuiltinProvider; 3] = [
        BuiltinProvider::Google,
        BuiltinProvider::OpenAi,
        BuiltinProvider::Groq,
    ];

    pub fn id(self) -> &'static str {
        match self {
            BuiltinProvider::Google => "google",
            BuiltinProvider::OpenAi => "openai",
            BuiltinProvider::Groq => "groq",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BuiltinProvider::Google => "Google",
            BuiltinProvider::OpenAi => "OpenAI",
            BuiltinProvider::Groq => "Groq",
        }
    }
}

impl fmt::Display for BuiltinProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for BuiltinProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        BuiltinProvider::ALL
            .into_iter()
            .find(|provider| provider.id().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                format!("unknown provider '{value}' (expected one of: google, openai, groq)")
            })
    }
}

/// Secrets for the built-in providers. `None` or an empty string means the
/// provider is not configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groq: Option<String>,
}

impl ApiKeys {
    fn slot(&self, provider: BuiltinProvider) -> &Option<String> {
        match provider {
            BuiltinProvider::Google => &self.google,
            BuiltinProvider::OpenAi => &self.openai,
            BuiltinProvider::Groq => &self.groq,
        }
    }

    fn slot_mut(&mut self, provider: BuiltinProvider) -> &mut Option<String> {
        match provider {
            BuiltinProvider::Google => &mut self.google,
            BuiltinProvider::OpenAi => &mut self.openai,
            BuiltinProvider::Groq => &mut self.groq,
        }
    }

    /// The configured key, skipping empty values.
    pub fn get(&self, provider: BuiltinProvider) -> Option<&str> {
        self.slot(provider)
            .as_deref()
            .filter(|key| !key.is_empty())
    }

    pub fn is_configured(&self, provider: BuiltinProvider) -> bool {
        self.get(provider).is_some()
    }

    pub fn any_configured(&self) -> bool {
        BuiltinProvider::ALL
            .into_iter()
            .any(|provider| self.is_configured(provider))
    }

    /// Take every non-empty key from `other`. Keys `other` lacks are kept.
    pub fn overlay(&mut self, other: &ApiKeys) -> bool {
        let mut changed = false;
        for provider in BuiltinProvider::ALL {
            if let Some(key) = other.get(provider) {
                let slot = self.slot_mut(provider);
                if slot.as_deref() != Some(key) {
                    *slot = Some(key.to_string());
                    changed = true;
                }
            }
        }
        changed
    }
}

/// A user-registered OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomProvider {
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Fallback model list, used until the backend reports one.
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCustomProvider {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<String>,
}

impl NewCustomProvider {
    fn with_id(self, id: String) -> CustomProvider {
        CustomProvider {
            id,
            name: self.name,
            base_url: self.base_url,
            api_key: self.api_key,
            models: self.models,
        }
    }
}

/// Model identifiers reported by the backend for the current credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableModels {
    #[serde(default)]
    pub google: Vec<String>,
    #[serde(default)]
    pub openai: Vec<String>,
    #[serde(default)]
    pub groq: Vec<String>,
    /// Custom-provider id to its model list.
    #[serde(default)]
    pub custom: HashMap<String, Vec<String>>,
}

impl AvailableModels {
    pub fn builtin(&self, provider: BuiltinProvider) -> &[String] {
        match provider {
            BuiltinProvider::Google => &self.google,
            BuiltinProvider::OpenAi => &self.openai,
            BuiltinProvider::Groq => &self.groq,
        }
    }
}

/// One entry of the model selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOption {
    pub token: String,
    pub label: String,
    pub provider_label: String,
}

/// Connection parameters for one chat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Provider name sent to the backend: a built-in id or `"custom"`.
    pub provider_name: String,
    /// Name shown to the user when the provider is misconfigured.
    pub provider_label: String,
    pub model_name: String,
    /// Empty when no credential is configured.
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsState {
    pub api_keys: ApiKeys,
    pub custom_providers: Vec<CustomProvider>,
    pub available_models: AvailableModels,
    /// Generation of the refresh that produced `available_models`.
    pub models_generation: u64,
}

impl SettingsState {
    pub fn has_credentials(&self) -> bool {
        self.api_keys.any_configured() || !self.custom_providers.is_empty()
    }

    pub fn custom_provider(&self, id: &str) -> Option<&CustomProvider> {
        self.custom_providers.iter().find(|provider| provider.id == id)
    }

    /// Resolve a selection into connection parameters. Unknown providers
    /// resolve with an empty key.
    pub fn resolve_model(&self, token: &ModelToken) -> ResolvedModel {
        match token {
            ModelToken::Builtin { provider, model } => {
                let api_key = provider
                    .parse::<BuiltinProvider>()
                    .ok()
                    .and_then(|builtin| self.api_keys.get(builtin))
                    .unwrap_or_default()
                    .to_string();
                ResolvedModel {
                    provider_name: provider.clone(),
                    provider_label: provider.clone(),
                    model_name: model.clone(),
                    api_key,
                    base_url: None,
                }
            }
            ModelToken::Custom { provider_id, model } => match self.custom_provider(provider_id) {
                Some(custom) => ResolvedModel {
                    provider_name: "custom".to_string(),
                    provider_label: custom.name.clone(),
                    model_name: model.clone(),
                    api_key: custom.api_key.clone(),
                    base_url: Some(custom.base_url.clone()),
                },
                None => ResolvedModel {
                    provider_name: "custom".to_string(),
                    provider_label: provider_id.clone(),
                    model_name: model.clone(),
                    api_key: String::new(),
                    base_url: None,
                },
            },
        }
    }

    fn custom_models<'a>(&'a self, provider: &'a CustomProvider) -> &'a [String] {
        self.available_models
            .custom
            .get(&provider.id)
            .map(Vec::as_slice)
            .unwrap_or(provider.models.as_slice())
    }

    /// The selector catalog: configured built-in providers with models, then
    /// every custom provider.
    pub fn selectable_models(&self) -> Vec<ModelOption> {
        let mut options = Vec::new();

        for provider in BuiltinProvider::ALL {
            if !self.api_keys.is_configured(provider) {
                continue;
            }
            for model in self.available_models.builtin(provider) {
                options.push(ModelOption {
                    token: ModelToken::builtin(provider.id(), model.as_str()).to_string(),
                    label: format_model_name(model),
                    provider_label: provider.display_name().to_string(),
                });
            }
        }

        for provider in &self.custom_providers {
            for model in self.custom_models(provider) {
                options.push(ModelOption {
                    token: ModelToken::custom(provider.id.as_str(), model.as_str()).to_string(),
                    label: model.clone(),
                    provider_label: provider.name.clone(),
                });
            }
        }

        options
    }

    /// Auto-selection: the first model of the first configured built-in
    /// provider, else the first model of the first custom provider.
    pub fn default_model_token(&self) -> Option<String> {
        let builtin = BuiltinProvider::ALL.into_iter().find_map(|provider| {
            if !self.api_keys.is_configured(provider) {
                return None;
            }
            self.available_models
                .builtin(provider)
                .first()
                .map(|model| ModelToken::builtin(provider.id(), model.as_str()))
        });

        builtin
            .or_else(|| {
                let provider = self.custom_providers.first()?;
                let model = self.custom_models(provider).first()?;
                Some(ModelToken::custom(provider.id.as_str(), model.as_str()))
            })
            .map(|token| token.to_string())
    }
}

/// Human-readable model name: `"models/gemini-1.5-pro"` becomes
/// `"Gemini 1.5 Pro"`.
pub fn format_model_name(model_id: &str) -> String {
    let name = model_id.strip_prefix("models/").unwrap_or(model_id);
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

struct RegistryInner {
    state: watch::Sender<SettingsState>,
    backend: Arc<dyn Backend>,
    tasks: BackgroundTasks,
    key_cache: Option<KeyCache>,
    refresh_generation: AtomicU64,
}

/// Process-wide settings service. Clones share the same state.
#[derive(Clone)]
pub struct SettingsRegistry {
    inner: Arc<RegistryInner>,
}

impl SettingsRegistry {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::build(backend, None)
    }

    /// Seed keys from the local cache and rewrite it after every key change.
    pub fn with_key_cache(backend: Arc<dyn Backend>, cache: KeyCache) -> Self {
        Self::build(backend, Some(cache))
    }

    fn build(backend: Arc<dyn Backend>, key_cache: Option<KeyCache>) -> Self {
        let api_keys = match key_cache.as_ref().map(KeyCache::load) {
            Some(Ok(keys)) => keys,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring unreadable API key cache");
                ApiKeys::default()
            }
            None => ApiKeys::default(),
        };

        let (state, _) = watch::channel(SettingsState {
            api_keys,
            ..SettingsState::default()
        });

        Self {
            inner: Arc::new(RegistryInner {
                state,
                backend,
                tasks: BackgroundTasks::new(),
                key_cache,
                refresh_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> SettingsState {
        self.inner.state.borrow().clone()
    }

    pub fn resolve_model(&self, token: &ModelToken) -> ResolvedModel {
        self.inner.state.borrow().resolve_model(token)
    }

    pub fn selectable_models(&self) -> Vec<ModelOption> {
        self.inner.state.borrow().selectable_models()
    }

    pub fn default_model_token(&self) -> Option<String> {
        self.inner.state.borrow().default_model_token()
    }

    pub fn set_api_key(&self, provider: BuiltinProvider, key: impl Into<String>) {
        let key = key.into();
        let changed = self.inner.state.send_if_modified(|state| {
            let slot = state.api_keys.slot_mut(provider);
            if slot.as_deref() == Some(key.as_str()) {
                return false;
            }
            *slot = Some(key);
            true
        });

        if changed {
            debug!(provider = provider.id(), "API key updated");
            self.after_keys_changed();
        }
    }

    pub fn remove_api_key(&self, provider: BuiltinProvider) {
        let changed = self
            .inner
            .state
            .send_if_modified(|state| state.api_keys.slot_mut(provider).take().is_some());

        if changed {
            debug!(provider = provider.id(), "API key removed");
            self.after_keys_changed();
        }
    }

    /// Register a provider and persist the updated list. Returns the new id.
    pub fn add_custom_provider(&self, provider: NewCustomProvider) -> String {
        let id = next_id();
        let provider = provider.with_id(id.clone());
        self.inner.state.send_modify(|state| {
            state.custom_providers.push(provider);
        });

        info!(provider_id = %id, "custom provider added");
        self.after_providers_changed();
        id
    }

    /// Returns whether a provider was removed.
    pub fn remove_custom_provider(&self, id: &str) -> bool {
        let removed = self.inner.state.send_if_modified(|state| {
            let before = state.custom_providers.len();
            state.custom_providers.retain(|provider| provider.id != id);
            state.custom_providers.len() != before
        });

        if removed {
            info!(provider_id = %id, "custom provider removed");
            self.after_providers_changed();
        }
        removed
    }

    /// Replace the model cache with the backend's listing for the current
    /// credentials. Failures are logged and keep the previous cache.
    pub async fn fetch_models(&self) {
        let generation = self.inner.refresh_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let request = {
            let state = self.inner.state.borrow();
            ListModelsRequest::new(&state.api_keys, &state.custom_providers)
        };

        match self.inner.backend.list_models(&request).await {
            Ok(models) => {
                let applied = self.inner.state.send_if_modified(|state| {
                    if generation <= state.models_generation {
                        return false;
                    }
                    state.available_models = models;
                    state.models_generation = generation;
                    true
                });
                if !applied {
                    debug!(generation, "discarding model list from a superseded refresh");
                }
            }
            Err(err) => {
                warn!(generation, error = %err, "failed to fetch models");
            }
        }
    }

    /// Pull custom providers and keys from the backend. Non-empty backend
    /// keys override local ones. Ends with a model refresh whenever any
    /// credential is configured, including keys seeded from the local cache.
    pub async fn load(&self) {
        match self.inner.backend.load_providers().await {
            Ok(providers) => {
                self.inner.state.send_if_modified(|state| {
                    if state.custom_providers == providers {
                        return false;
                    }
                    state.custom_providers = providers;
                    true
                });
            }
            Err(err) => warn!(error = %err, "failed to load custom providers"),
        }

        match self.inner.backend.load_keys().await {
            Ok(keys) => {
                let keys_changed = self
                    .inner
                    .state
                    .send_if_modified(|state| state.api_keys.overlay(&keys));
                if keys_changed {
                    self.write_key_cache();
                }
            }
            Err(err) => warn!(error = %err, "failed to load API keys"),
        }

        self.schedule_refresh();
    }

    /// Persist the current keys to the backend in the background.
    pub fn save_keys(&self) {
        let keys = self.inner.state.borrow().api_keys.clone();
        let backend = Arc::clone(&self.inner.backend);
        self.inner
            .tasks
            .spawn_best_effort("save-keys", async move { backend.save_keys(&keys).await });
    }

    pub async fn wait_for_background(&self) {
        self.inner.tasks.wait().await;
    }

    fn after_keys_changed(&self) {
        self.write_key_cache();
        self.schedule_refresh();
    }

    fn after_providers_changed(&self) {
        let providers = self.inner.state.borrow().custom_providers.clone();
        let backend = Arc::clone(&self.inner.backend);
        self.inner.tasks.spawn_best_effort("save-providers", async move {
            backend.save_providers(&providers).await
        });
        self.schedule_refresh();
    }

    fn write_key_cache(&self) {
        let Some(cache) = &self.inner.key_cache else {
            return;
        };
        let keys = self.inner.state.borrow().api_keys.clone();
        if let Err(err) = cache.save(&keys) {
            warn!(error = %err, "failed to write API key cache");
        }
    }

    fn schedule_refresh(&self) {
        if !self.inner.state.borrow().has_credentials() {
            return;
        }
        let registry = self.clone();
        self.inner.tasks.spawn("refresh-models", async move {
            registry.fetch_models().await;
        });
    }
}
