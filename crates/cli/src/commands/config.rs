use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use roomservice_core::config::AppConfig;
use roomservice_core::flows::RoomCapturePolicy;
use toml::Value;

use crate::commands::load_config;

pub fn run(config_path: Option<&Path>) -> String {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = config_path.map(Path::to_path_buf).or_else(detect_config_path);
    let file_doc = load_config_file_doc(file_path.as_deref());
    render(&config, file_path.as_deref(), file_doc.as_ref())
}

pub fn render(config: &AppConfig, file_path: Option<&Path>, file_doc: Option<&Value>) -> String {
    let conversation = &config.conversation;
    let room_capture = match conversation.room_capture_policy {
        RoomCapturePolicy::Acknowledge => "acknowledge",
        RoomCapturePolicy::PromptConfirmation => "prompt_confirmation",
    };

    let fields: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("transport.max_retries", config.transport.max_retries.to_string()),
        ("transport.base_delay_ms", config.transport.base_delay_ms.to_string()),
        ("transport.max_delay_ms", config.transport.max_delay_ms.to_string()),
        ("transport.send_timeout_ms", config.transport.send_timeout_ms.to_string()),
        ("transport.send_attempts", config.transport.send_attempts.to_string()),
        ("conversation.dedup_capacity", conversation.dedup_capacity.to_string()),
        ("conversation.dedup_retention_secs", conversation.dedup_retention_secs.to_string()),
        ("conversation.rating_prompt_delay_secs", conversation.rating_prompt_delay_secs.to_string()),
        ("conversation.idle_expiry_secs", conversation.idle_expiry_secs.to_string()),
        ("conversation.room_capture_policy", room_capture.to_string()),
        ("conversation.currency_symbol", conversation.currency_symbol.clone()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.health_check_port", config.server.health_check_port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_lowercase()),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in fields {
        lines.push(render_line(key, &value, field_source(key, file_doc, file_path)));
    }

    if config.tenants.is_empty() {
        lines.push("- tenants = <none>".to_string());
    }
    for tenant in &config.tenants {
        let menu = tenant
            .menu_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<unset>".to_string());
        lines.push(format!(
            "- tenant {} = name: {}, admin_target: {}, skip_room_capture: {}, menu_file: {}",
            tenant.id,
            tenant.name,
            redact_target(&tenant.admin_target),
            tenant.skip_room_capture,
            menu
        ));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("roomservice.toml"), PathBuf::from("config/roomservice.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn env_key(key_path: &str) -> String {
    format!("ROOMSERVICE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn field_source(key_path: &str, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
        return format!("env ({env_key})");
    }

    if file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Admin targets are phone-style identities; only the last two characters
/// are shown.
fn redact_target(target: &str) -> String {
    let trimmed = target.trim();
    let visible: String =
        trimmed.chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
    if trimmed.chars().count() <= 2 {
        return "<redacted>".to_string();
    }
    format!("***{visible}")
}
