//! Configuration types for a wabot instance.
//!
//! [`WabotConfig`] is the top-level configuration loaded from `wabot.toml`.
//! It names the bot owners, the command prefix, the admission tunables and
//! the initial state of the runtime feature toggles. Every field except
//! `bot.owners` has a default, so the smallest valid file is:
//!
//! ```toml
//! [bot]
//! owners = ["628111222333"]
//! ```
//!
//! `WABOT_*` environment variables override file values (see
//! [`WabotConfig::apply_env_overrides`]).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::{NormalizeRules, OwnerSet};
use crate::WabotError;

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "wabot.toml";

/// Config files larger than this are rejected.
const MAX_CONFIG_FILE_SIZE: u64 = 256 * 1024;

/// Identity and surface of the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    /// Display name used in the welcome message.
    #[serde(default = "default_bot_name")]
    pub name: String,
    /// Prefix every command must start with.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Owner identities (phone numbers or chat addresses). Required.
    #[serde(default)]
    pub owners: Vec<String>,
    /// Country code that replaces a leading `0` in phone numbers.
    #[serde(default = "default_country_code")]
    pub country_code: String,
    /// Command text longer than this is truncated.
    #[serde(default = "default_max_input_len")]
    pub max_input_len: usize,
}

/// Admission tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Sliding window of the per-user rate limiter, in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    /// Requests allowed per window.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
    /// Users tracked by the rate limiter before idle ones are evicted.
    #[serde(default = "default_rate_limit_max_users")]
    pub rate_limit_max_users: usize,
    /// Cooldown applied when a command declares none, in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    pub default_cooldown_ms: u64,
    /// Heavy commands allowed to run at once.
    #[serde(default = "default_max_heavy_concurrency")]
    pub max_heavy_concurrency: usize,
    /// Block duration used by the admin `block` command when none is given.
    #[serde(default = "default_block_minutes")]
    pub default_block_minutes: u64,
    /// Interval of the background maintenance sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Security policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    /// Commands only an owner may run.
    #[serde(default = "default_owner_only_commands")]
    pub owner_only_commands: Vec<String>,
    /// Commands that require group admin rights when used in a group.
    #[serde(default = "default_admin_only_group_commands")]
    pub admin_only_group_commands: Vec<String>,
    /// Suspicious events tolerated inside the window before auto-blocking.
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: usize,
    /// Window over which suspicious events are counted, in seconds.
    #[serde(default = "default_suspicious_window_secs")]
    pub suspicious_window_secs: u64,
    /// Suspicious events older than this are purged by the sweep.
    #[serde(default = "default_suspicious_retention_secs")]
    pub suspicious_retention_secs: u64,
    /// Entries kept per user in the suspicious-activity log.
    #[serde(default = "default_suspicious_log_cap")]
    pub suspicious_log_cap: usize,
    /// Duration of an automatic block, in minutes.
    #[serde(default = "default_auto_block_minutes")]
    pub auto_block_minutes: u64,
}

/// Initial state of the runtime feature toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureConfig {
    /// Ignore private chats from everyone except the owners.
    #[serde(default)]
    pub owner_only_chat: bool,
    /// Screen command text for injection patterns.
    #[serde(default)]
    pub chat_filter: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WabotConfig {
    pub bot: BotConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub features: FeatureConfig,
}

fn default_bot_name() -> String {
    "wabot".into()
}
fn default_prefix() -> String {
    ".".into()
}
fn default_country_code() -> String {
    "62".into()
}
fn default_max_input_len() -> usize {
    1000
}
fn default_rate_limit_window_ms() -> u64 {
    60_000
}
fn default_rate_limit_max() -> u32 {
    10
}
fn default_rate_limit_max_users() -> usize {
    10_000
}
fn default_cooldown_ms() -> u64 {
    3_000
}
fn default_max_heavy_concurrency() -> usize {
    3
}
fn default_block_minutes() -> u64 {
    60
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_owner_only_commands() -> Vec<String> {
    [
        "block",
        "unblock",
        "unblockall",
        "listblock",
        "allow",
        "revoke",
        "listallow",
        "toggle",
        "stats",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_admin_only_group_commands() -> Vec<String> {
    vec!["kick".into(), "promote".into(), "demote".into()]
}
fn default_suspicious_threshold() -> usize {
    20
}
fn default_suspicious_window_secs() -> u64 {
    60
}
fn default_suspicious_retention_secs() -> u64 {
    3_600
}
fn default_suspicious_log_cap() -> usize {
    100
}
fn default_auto_block_minutes() -> u64 {
    30
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            prefix: default_prefix(),
            owners: Vec::new(),
            country_code: default_country_code(),
            max_input_len: default_max_input_len(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_window_ms: default_rate_limit_window_ms(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_max_users: default_rate_limit_max_users(),
            default_cooldown_ms: default_cooldown_ms(),
            max_heavy_concurrency: default_max_heavy_concurrency(),
            default_block_minutes: default_block_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            owner_only_commands: default_owner_only_commands(),
            admin_only_group_commands: default_admin_only_group_commands(),
            suspicious_threshold: default_suspicious_threshold(),
            suspicious_window_secs: default_suspicious_window_secs(),
            suspicious_retention_secs: default_suspicious_retention_secs(),
            suspicious_log_cap: default_suspicious_log_cap(),
            auto_block_minutes: default_auto_block_minutes(),
        }
    }
}

impl WabotConfig {
    /// A configuration with the given owners and every other field defaulted.
    pub fn with_owners(owners: &[&str]) -> Self {
        Self {
            bot: BotConfig {
                owners: owners.iter().map(|o| o.to_string()).collect(),
                ..BotConfig::default()
            },
            limits: LimitsConfig::default(),
            security: SecurityConfig::default(),
            features: FeatureConfig::default(),
        }
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, WabotError> {
        toml::from_str(content).map_err(|e| WabotError::ConfigError(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, WabotError> {
        toml::to_string_pretty(self).map_err(|e| WabotError::ConfigError(e.to_string()))
    }

    /// Load, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, WabotError> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > MAX_CONFIG_FILE_SIZE {
            return Err(WabotError::ConfigError(format!(
                "{} is {} bytes, larger than the {MAX_CONFIG_FILE_SIZE} byte limit",
                path.display(),
                meta.len()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        debug!(path = %path.display(), owners = config.bot.owners.len(), "loaded configuration");
        Ok(config)
    }

    /// Override fields from `WABOT_*` variables.
    ///
    /// - `WABOT_OWNERS`: comma-separated owner ids (replaces the list)
    /// - `WABOT_PREFIX`: command prefix
    /// - `WABOT_COUNTRY_CODE`: regional rewrite country code
    ///
    /// The lookup is injected so tests do not touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(owners) = lookup("WABOT_OWNERS") {
            self.bot.owners = owners
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(prefix) = lookup("WABOT_PREFIX") {
            self.bot.prefix = prefix;
        }
        if let Some(cc) = lookup("WABOT_COUNTRY_CODE") {
            self.bot.country_code = cc;
        }
    }

    /// Reject configurations the bot cannot run safely with.
    ///
    /// A missing owner is fatal: every owner check would be meaningless.
    pub fn validate(&self) -> Result<(), WabotError> {
        if self.owner_set().is_empty() {
            return Err(WabotError::ConfigError(
                "bot.owners must name at least one valid owner id".into(),
            ));
        }
        if self.bot.prefix.is_empty() {
            return Err(WabotError::ConfigError("bot.prefix cannot be empty".into()));
        }
        if self.bot.country_code.is_empty()
            || !self.bot.country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(WabotError::ConfigError(format!(
                "bot.country_code must be digits, got {:?}",
                self.bot.country_code
            )));
        }
        if self.bot.max_input_len == 0 {
            return Err(WabotError::ConfigError(
                "bot.max_input_len must be positive".into(),
            ));
        }
        if self.limits.rate_limit_window_ms == 0 || self.limits.rate_limit_max == 0 {
            return Err(WabotError::ConfigError(
                "rate limit window and max must be positive".into(),
            ));
        }
        if self.limits.rate_limit_max_users == 0 {
            return Err(WabotError::ConfigError(
                "limits.rate_limit_max_users must be positive".into(),
            ));
        }
        if self.security.suspicious_log_cap == 0 {
            return Err(WabotError::ConfigError(
                "security.suspicious_log_cap must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Normalization rules derived from the bot section.
    pub fn normalize_rules(&self) -> NormalizeRules {
        NormalizeRules::new(self.bot.country_code.clone())
    }

    /// The owner predicate built from the configured owner ids.
    pub fn owner_set(&self) -> OwnerSet {
        OwnerSet::new(&self.bot.owners, self.normalize_rules())
    }
}
