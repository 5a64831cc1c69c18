use crate::core::settings::SettingsState;

/// Render the selectable models grouped by provider, marking the one that
/// would be picked automatically.
pub fn format_model_list(state: &SettingsState) -> String {
    let options = state.selectable_models();
    if options.is_empty() {
        return if state.has_credentials() {
            "No models available. Check that the backend is running.".to_string()
        } else {
            "No API keys configured. Use 'spacechat keys set <provider> <key>'.".to_string()
        };
    }

    let default_token = state.default_model_token();
    let mut output = String::from("Available models:\n");
    let mut current_group: Option<&str> = None;

    for option in &options {
        if current_group != Some(option.provider_label.as_str()) {
            output.push_str(&format!("\n{}\n", option.provider_label));
            current_group = Some(option.provider_label.as_str());
        }
        let marker = if default_token.as_deref() == Some(option.token.as_str()) {
            "*"
        } else {
            " "
        };
        output.push_str(&format!("  {marker} {}  ({})\n", option.label, option.token));
    }

    if default_token.is_some() {
        output.push_str("\n* = selected when no model is given");
    }
    output
}

pub fn list_models(state: &SettingsState) {
    println!("{}", format_model_list(state));
}
