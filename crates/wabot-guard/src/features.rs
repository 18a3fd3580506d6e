//! Runtime feature toggles.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use wabot_types::FeatureConfig;

/// Names accepted by [`Features::toggle`].
pub const FEATURE_NAMES: &[&str] = &["owner_only_chat", "chat_filter"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feature {0:?} (known: owner_only_chat, chat_filter)")]
pub struct UnknownFeature(pub String);

pub struct Features {
    owner_only_chat: AtomicBool,
    chat_filter: AtomicBool,
}

impl Features {
    pub fn new(initial: &FeatureConfig) -> Self {
        Self {
            owner_only_chat: AtomicBool::new(initial.owner_only_chat),
            chat_filter: AtomicBool::new(initial.chat_filter),
        }
    }

    fn flag(&self, name: &str) -> Option<&AtomicBool> {
        match name.to_lowercase().replace('-', "_").as_str() {
            "owner_only_chat" | "self" => Some(&self.owner_only_chat),
            "chat_filter" | "filter" => Some(&self.chat_filter),
            _ => None,
        }
    }

    /// Set a feature by name; returns the previous value.
    pub fn toggle(&self, name: &str, on: bool) -> Result<bool, UnknownFeature> {
        let flag = self
            .flag(name)
            .ok_or_else(|| UnknownFeature(name.to_string()))?;
        Ok(flag.swap(on, Ordering::AcqRel))
    }

    pub fn owner_only_chat(&self) -> bool {
        self.owner_only_chat.load(Ordering::Acquire)
    }

    pub fn chat_filter(&self) -> bool {
        self.chat_filter.load(Ordering::Acquire)
    }

    /// Current state of every feature.
    pub fn snapshot(&self) -> FeatureConfig {
        FeatureConfig {
            owner_only_chat: self.owner_only_chat(),
            chat_filter: self.chat_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_by_name_and_alias() {
        let f = Features::new(&FeatureConfig::default());
        assert!(!f.chat_filter());
        assert_eq!(f.toggle("chat_filter", true), Ok(false));
        assert!(f.chat_filter());
        assert_eq!(f.toggle("self", true), Ok(false));
        assert!(f.owner_only_chat());
        assert_eq!(f.toggle("Owner-Only-Chat", false), Ok(true));
        assert_eq!(f.snapshot(), FeatureConfig { owner_only_chat: false, chat_filter: true });
    }

    #[test]
    fn unknown_feature_rejected() {
        let f = Features::new(&FeatureConfig::default());
        let err = f.toggle("turbo", true).unwrap_err();
        assert!(err.to_string().contains("turbo"));
    }
}
