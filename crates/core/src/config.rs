use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::tenant::Tenant;
use crate::flows::RoomCapturePolicy;
use crate::retry::RetryPolicy;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub transport: TransportConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub tenants: Vec<TenantConfig>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TransportConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub send_timeout_ms: u64,
    pub send_attempts: u32,
}

impl TransportConfig {
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationConfig {
    pub dedup_capacity: usize,
    pub dedup_retention_secs: u64,
    pub rating_prompt_delay_secs: u64,
    pub idle_expiry_secs: u64,
    pub room_capture_policy: RoomCapturePolicy,
    pub currency_symbol: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,
    pub name: String,
    pub admin_target: String,
    #[serde(default)]
    pub skip_room_capture: bool,
    #[serde(default)]
    pub menu_file: Option<PathBuf>,
}

impl TenantConfig {
    pub fn to_tenant(&self) -> Tenant {
        let mut tenant = Tenant::new(&self.id, &self.name, &self.admin_target);
        tenant.skip_room_capture = self.skip_room_capture;
        tenant
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub health_check_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://roomservice.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            transport: TransportConfig {
                max_retries: 5,
                base_delay_ms: 1_000,
                max_delay_ms: 30_000,
                send_timeout_ms: 10_000,
                send_attempts: 3,
            },
            conversation: ConversationConfig {
                dedup_capacity: 1_000,
                dedup_retention_secs: 600,
                rating_prompt_delay_secs: 1_800,
                idle_expiry_secs: 86_400,
                room_capture_policy: RoomCapturePolicy::Acknowledge,
                currency_symbol: "₹".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            tenants: Vec::new(),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

fn parse_room_capture(key: &str, value: &str) -> Result<RoomCapturePolicy, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "acknowledge" => Ok(RoomCapturePolicy::Acknowledge),
        "prompt_confirmation" => Ok(RoomCapturePolicy::PromptConfirmation),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch, path.parent());
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("roomservice.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn tenant(&self, id: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|tenant| tenant.id == id)
    }

    fn apply_patch(&mut self, patch: ConfigPatch, base_dir: Option<&Path>) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(transport) = patch.transport {
            if let Some(max_retries) = transport.max_retries {
                self.transport.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = transport.base_delay_ms {
                self.transport.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = transport.max_delay_ms {
                self.transport.max_delay_ms = max_delay_ms;
            }
            if let Some(send_timeout_ms) = transport.send_timeout_ms {
                self.transport.send_timeout_ms = send_timeout_ms;
            }
            if let Some(send_attempts) = transport.send_attempts {
                self.transport.send_attempts = send_attempts;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(dedup_capacity) = conversation.dedup_capacity {
                self.conversation.dedup_capacity = dedup_capacity;
            }
            if let Some(dedup_retention_secs) = conversation.dedup_retention_secs {
                self.conversation.dedup_retention_secs = dedup_retention_secs;
            }
            if let Some(delay) = conversation.rating_prompt_delay_secs {
                self.conversation.rating_prompt_delay_secs = delay;
            }
            if let Some(idle_expiry_secs) = conversation.idle_expiry_secs {
                self.conversation.idle_expiry_secs = idle_expiry_secs;
            }
            if let Some(policy) = conversation.room_capture_policy {
                self.conversation.room_capture_policy = policy;
            }
            if let Some(currency_symbol) = conversation.currency_symbol {
                self.conversation.currency_symbol = currency_symbol;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(tenants) = patch.tenants {
            self.tenants = tenants
                .into_iter()
                .map(|mut tenant| {
                    // Menu files resolve relative to the config file.
                    if let (Some(menu_file), Some(base)) = (tenant.menu_file.as_mut(), base_dir) {
                        if menu_file.is_relative() {
                            *menu_file = base.join(&*menu_file);
                        }
                    }
                    tenant
                })
                .collect();
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ROOMSERVICE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ROOMSERVICE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("ROOMSERVICE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ROOMSERVICE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROOMSERVICE_TRANSPORT_MAX_RETRIES") {
            self.transport.max_retries = parse_u32("ROOMSERVICE_TRANSPORT_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_TRANSPORT_BASE_DELAY_MS") {
            self.transport.base_delay_ms =
                parse_u64("ROOMSERVICE_TRANSPORT_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_TRANSPORT_MAX_DELAY_MS") {
            self.transport.max_delay_ms = parse_u64("ROOMSERVICE_TRANSPORT_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_TRANSPORT_SEND_TIMEOUT_MS") {
            self.transport.send_timeout_ms =
                parse_u64("ROOMSERVICE_TRANSPORT_SEND_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_TRANSPORT_SEND_ATTEMPTS") {
            self.transport.send_attempts =
                parse_u32("ROOMSERVICE_TRANSPORT_SEND_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("ROOMSERVICE_CONVERSATION_DEDUP_CAPACITY") {
            self.conversation.dedup_capacity =
                parse_usize("ROOMSERVICE_CONVERSATION_DEDUP_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_CONVERSATION_DEDUP_RETENTION_SECS") {
            self.conversation.dedup_retention_secs =
                parse_u64("ROOMSERVICE_CONVERSATION_DEDUP_RETENTION_SECS", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_CONVERSATION_RATING_PROMPT_DELAY_SECS") {
            self.conversation.rating_prompt_delay_secs =
                parse_u64("ROOMSERVICE_CONVERSATION_RATING_PROMPT_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_CONVERSATION_IDLE_EXPIRY_SECS") {
            self.conversation.idle_expiry_secs =
                parse_u64("ROOMSERVICE_CONVERSATION_IDLE_EXPIRY_SECS", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_CONVERSATION_ROOM_CAPTURE_POLICY") {
            self.conversation.room_capture_policy =
                parse_room_capture("ROOMSERVICE_CONVERSATION_ROOM_CAPTURE_POLICY", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_CONVERSATION_CURRENCY_SYMBOL") {
            self.conversation.currency_symbol = value;
        }

        if let Some(value) = read_env("ROOMSERVICE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ROOMSERVICE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("ROOMSERVICE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("ROOMSERVICE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ROOMSERVICE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("ROOMSERVICE_LOGGING_LEVEL").or_else(|| read_env("ROOMSERVICE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ROOMSERVICE_LOGGING_FORMAT").or_else(|| read_env("ROOMSERVICE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(port) = overrides.health_check_port {
            self.server.health_check_port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_transport(&self.transport)?;
        validate_conversation(&self.conversation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_tenants(&self.tenants)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("roomservice.toml"), PathBuf::from("config/roomservice.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_transport(transport: &TransportConfig) -> Result<(), ConfigError> {
    if transport.base_delay_ms > transport.max_delay_ms {
        return Err(ConfigError::Validation(
            "transport.base_delay_ms must not exceed transport.max_delay_ms".to_string(),
        ));
    }

    if transport.send_attempts == 0 {
        return Err(ConfigError::Validation(
            "transport.send_attempts must be at least 1".to_string(),
        ));
    }

    if transport.send_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "transport.send_timeout_ms must be greater than zero; sends may not wait forever"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.dedup_capacity == 0 {
        return Err(ConfigError::Validation(
            "conversation.dedup_capacity must be greater than zero".to_string(),
        ));
    }

    if conversation.dedup_retention_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.dedup_retention_secs must be greater than zero".to_string(),
        ));
    }

    if conversation.idle_expiry_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.idle_expiry_secs must be greater than zero".to_string(),
        ));
    }

    if conversation.currency_symbol.trim().is_empty() {
        return Err(ConfigError::Validation(
            "conversation.currency_symbol must not be empty (e.g. \"₹\" or \"$\")".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_tenants(tenants: &[TenantConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for tenant in tenants {
        if tenant.id.trim().is_empty() {
            return Err(ConfigError::Validation("tenants[].id must not be empty".to_string()));
        }
        if !seen.insert(tenant.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "tenant `{}` is declared more than once",
                tenant.id
            )));
        }
        if tenant.admin_target.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "tenants[{}].admin_target is required so orders reach the hotel",
                tenant.id
            )));
        }
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    transport: Option<TransportPatch>,
    conversation: Option<ConversationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    tenants: Option<Vec<TenantConfig>>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TransportPatch {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    send_timeout_ms: Option<u64>,
    send_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    dedup_capacity: Option<usize>,
    dedup_retention_secs: Option<u64>,
    rating_prompt_delay_secs: Option<u64>,
    idle_expiry_secs: Option<u64>,
    room_capture_policy: Option<RoomCapturePolicy>,
    currency_symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
