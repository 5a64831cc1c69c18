use crate::core::settings::{BuiltinProvider, SettingsState};

pub fn format_provider_list(state: &SettingsState) -> String {
    let mut content = String::from("Built-in providers:\n");
    for provider in BuiltinProvider::ALL {
        let status = if state.api_keys.is_configured(provider) {
            "✅"
        } else {
            "❌"
        };
        content.push_str(&format!("  {status} {}\n", provider.display_name()));
    }

    content.push_str("\nCustom providers:\n");
    if state.custom_providers.is_empty() {
        content.push_str("  (none)\n");
    }
    for provider in &state.custom_providers {
        let models = state
            .available_models
            .custom
            .get(&provider.id)
            .unwrap_or(&provider.models);
        content.push_str(&format!(
            "  {} | {} | {} | {} model(s)\n",
            provider.id,
            provider.name,
            provider.base_url,
            models.len()
        ));
    }
    content
}

pub fn list_providers(state: &SettingsState) {
    print!("{}", format_provider_list(state));
}
