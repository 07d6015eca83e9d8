//! Layered application configuration: defaults, TOML file, `TIRE_*` environment overrides
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::DatePolicy;

pub const CONFIG_FILE: &str = "tire-approval.toml";

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub photos: PhotoConfig,
    pub validation: ValidationConfig,
    pub approvals: ApprovalConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct PhotoConfig {
    pub canonical_base: String,
    pub alternate_base: String,
    pub placeholders: Vec<String>,
    pub blob_markers: Vec<String>,
    pub suspect_min_len: usize,
    pub max_reference_len: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ValidationConfig {
    pub date_policy: DatePolicy,
}

#[derive(Clone, Debug)]
pub struct ApprovalConfig {
    pub delete_roles: Vec<String>,
    pub delete_scope: DeleteScope,
}

#[derive(Clone, Debug, Default)]
pub struct NotificationConfig {
    pub dashboard_base_url: Option<String>,
    pub manager: Option<String>,
    pub tto: Option<String>,
    pub engineer: Option<String>,
    pub seller: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Which statuses a request may be deleted from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    Any,
    PendingOnly,
    #[default]
    PendingOrTerminal,
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
    pub storage_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub date_policy: Option<DatePolicy>,
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

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tire-requests.db"),
        }
    }
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            canonical_base: "/uploads".to_string(),
            alternate_base: "/files".to_string(),
            placeholders: vec![
                "/images/tire1.jpeg".to_string(),
                "/images/tire2.jpeg".to_string(),
                "/images/tire3.jpeg".to_string(),
            ],
            blob_markers: vec!["blob:".to_string()],
            suspect_min_len: 100,
            max_reference_len: 2048,
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            delete_roles: vec!["requester".to_string(), "manager".to_string()],
            delete_scope: DeleteScope::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
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

impl std::str::FromStr for DeleteScope {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "pending_only" => Ok(Self::PendingOnly),
            "pending_or_terminal" => Ok(Self::PendingOrTerminal),
            other => Err(ConfigError::Validation(format!(
                "unsupported delete scope `{other}` (expected any|pending_only|pending_or_terminal)"
            ))),
        }
    }
}

fn parse_date_policy(key: &str, value: &str) -> Result<DatePolicy, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "unconstrained" => Ok(DatePolicy::Unconstrained),
        "no_future" => Ok(DatePolicy::NoFuture),
        "no_past" => Ok(DatePolicy::NoPast),
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
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document on top of the defaults, without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let patch = toml::from_str::<ConfigPatch>(raw).map_err(|source| {
            ConfigError::ParseFile {
                path: PathBuf::from("<inline>"),
                source,
            }
        })?;
        let mut config = Self::default();
        config.apply_patch(patch);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(path) = storage.path {
                self.storage.path = path;
            }
        }

        if let Some(photos) = patch.photos {
            if let Some(canonical_base) = photos.canonical_base {
                self.photos.canonical_base = canonical_base;
            }
            if let Some(alternate_base) = photos.alternate_base {
                self.photos.alternate_base = alternate_base;
            }
            if let Some(placeholders) = photos.placeholders {
                self.photos.placeholders = placeholders;
            }
            if let Some(blob_markers) = photos.blob_markers {
                self.photos.blob_markers = blob_markers;
            }
            if let Some(suspect_min_len) = photos.suspect_min_len {
                self.photos.suspect_min_len = suspect_min_len;
            }
            if let Some(max_reference_len) = photos.max_reference_len {
                self.photos.max_reference_len = max_reference_len;
            }
        }

        if let Some(validation) = patch.validation {
            if let Some(date_policy) = validation.date_policy {
                self.validation.date_policy = date_policy;
            }
        }

        if let Some(approvals) = patch.approvals {
            if let Some(delete_roles) = approvals.delete_roles {
                self.approvals.delete_roles = delete_roles;
            }
            if let Some(delete_scope) = approvals.delete_scope {
                self.approvals.delete_scope = delete_scope;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(dashboard_base_url) = notifications.dashboard_base_url {
                self.notifications.dashboard_base_url = Some(dashboard_base_url);
            }
            if let Some(manager) = notifications.manager {
                self.notifications.manager = Some(manager);
            }
            if let Some(tto) = notifications.tto {
                self.notifications.tto = Some(tto);
            }
            if let Some(engineer) = notifications.engineer {
                self.notifications.engineer = Some(engineer);
            }
            if let Some(seller) = notifications.seller {
                self.notifications.seller = Some(seller);
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
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TIRE_STORAGE_PATH") {
            self.storage.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("TIRE_PHOTOS_CANONICAL_BASE") {
            self.photos.canonical_base = value;
        }
        if let Some(value) = read_env("TIRE_PHOTOS_ALTERNATE_BASE") {
            self.photos.alternate_base = value;
        }
        if let Some(value) = read_env("TIRE_PHOTOS_SUSPECT_MIN_LEN") {
            self.photos.suspect_min_len = parse_usize("TIRE_PHOTOS_SUSPECT_MIN_LEN", &value)?;
        }

        if let Some(value) = read_env("TIRE_VALIDATION_DATE_POLICY") {
            self.validation.date_policy = parse_date_policy("TIRE_VALIDATION_DATE_POLICY", &value)?;
        }

        if let Some(value) = read_env("TIRE_APPROVALS_DELETE_ROLES") {
            self.approvals.delete_roles = value
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("TIRE_APPROVALS_DELETE_SCOPE") {
            self.approvals.delete_scope = value.parse()?;
        }

        if let Some(value) = read_env("TIRE_NOTIFICATIONS_DASHBOARD_BASE_URL") {
            self.notifications.dashboard_base_url = Some(value);
        }
        if let Some(value) = read_env("TIRE_NOTIFICATIONS_MANAGER") {
            self.notifications.manager = Some(value);
        }
        if let Some(value) = read_env("TIRE_NOTIFICATIONS_TTO") {
            self.notifications.tto = Some(value);
        }
        if let Some(value) = read_env("TIRE_NOTIFICATIONS_ENGINEER") {
            self.notifications.engineer = Some(value);
        }
        if let Some(value) = read_env("TIRE_NOTIFICATIONS_SELLER") {
            self.notifications.seller = Some(value);
        }

        let log_level = read_env("TIRE_LOGGING_LEVEL").or_else(|| read_env("TIRE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TIRE_LOGGING_FORMAT").or_else(|| read_env("TIRE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(storage_path) = overrides.storage_path {
            self.storage.path = storage_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(date_policy) = overrides.date_policy {
            self.validation.date_policy = date_policy;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_storage(&self.storage)?;
        validate_photos(&self.photos)?;
        validate_approvals(&self.approvals)?;
        validate_notifications(&self.notifications)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE), PathBuf::from("config").join(CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
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

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "storage.path must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_photos(photos: &PhotoConfig) -> Result<(), ConfigError> {
    if photos.placeholders.is_empty() {
        return Err(ConfigError::Validation(
            "photos.placeholders needs at least one image".to_string(),
        ));
    }
    if photos
        .placeholders
        .iter()
        .any(|placeholder| placeholder.trim().is_empty())
    {
        return Err(ConfigError::Validation(
            "photos.placeholders must not contain empty entries".to_string(),
        ));
    }
    if photos.canonical_base.trim().is_empty() || photos.alternate_base.trim().is_empty() {
        return Err(ConfigError::Validation(
            "photos.canonical_base and photos.alternate_base are required".to_string(),
        ));
    }
    if photos.suspect_min_len == 0 || photos.suspect_min_len > photos.max_reference_len {
        return Err(ConfigError::Validation(
            "photos.suspect_min_len must be in range 1..=photos.max_reference_len".to_string(),
        ));
    }
    Ok(())
}

fn validate_approvals(approvals: &ApprovalConfig) -> Result<(), ConfigError> {
    if approvals
        .delete_roles
        .iter()
        .any(|role| role.trim().is_empty())
    {
        return Err(ConfigError::Validation(
            "approvals.delete_roles must not contain empty entries".to_string(),
        ));
    }
    Ok(())
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &notifications.dashboard_base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "notifications.dashboard_base_url must start with http:// or https://".to_string(),
            ));
        }
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    photos: Option<PhotosPatch>,
    validation: Option<ValidationPatch>,
    approvals: Option<ApprovalsPatch>,
    notifications: Option<NotificationsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct PhotosPatch {
    canonical_base: Option<String>,
    alternate_base: Option<String>,
    placeholders: Option<Vec<String>>,
    blob_markers: Option<Vec<String>>,
    suspect_min_len: Option<usize>,
    max_reference_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationPatch {
    date_policy: Option<DatePolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsPatch {
    delete_roles: Option<Vec<String>>,
    delete_scope: Option<DeleteScope>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    dashboard_base_url: Option<String>,
    manager: Option<String>,
    tto: Option<String>,
    engineer: Option<String>,
    seller: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
