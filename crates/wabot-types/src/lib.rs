//! Core types shared across all wabot crates.
//!
//! Defines the bot configuration, the chat identity model used as the key
//! for every piece of per-user security state, and the startup error type.

pub mod config;
pub mod error;
pub mod identity;

pub use config::{
    BotConfig, FeatureConfig, LimitsConfig, SecurityConfig, WabotConfig, CONFIG_FILENAME,
};
pub use error::WabotError;
pub use identity::{
    normalize, CanonicalId, Identity, NormalizeRules, NormalizedId, OwnerSet, DIRECT_SUFFIX,
    LINKED_SUFFIX,
};
