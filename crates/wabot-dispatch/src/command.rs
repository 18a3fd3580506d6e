//! Command registration and the handler contract.
//!
//! A [`Command`] exposes static [`CommandDescriptor`] metadata, an optional
//! context check, and an async `execute`. The [`CommandRegistry`] resolves
//! names and aliases case-insensitively.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;
use wabot_guard::{ArgKind, ParsedCommand, SecurityManager};

use crate::transport::{InboundMessage, ReplySink, TransportError};

/// Static metadata of a command. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub aliases: Vec<&'static str>,
    /// Menu section.
    pub category: &'static str,
    /// One-line description shown in the menu.
    pub description: &'static str,
    /// Per-command cooldown; the configured default applies when `None`.
    pub cooldown: Option<Duration>,
    /// Holds external resources for a long time; subject to the heavy
    /// concurrency ceiling.
    pub heavy: bool,
    /// Refused for non-owners regardless of the configured owner-only list.
    pub owner_only: bool,
    pub requires_group: bool,
    pub requires_admin: bool,
    pub requires_media: bool,
    pub args: ArgKind,
}

impl CommandDescriptor {
    pub fn new(name: &'static str, category: &'static str) -> Self {
        Self {
            name,
            aliases: Vec::new(),
            category,
            description: "",
            cooldown: None,
            heavy: false,
            owner_only: false,
            requires_group: false,
            requires_admin: false,
            requires_media: false,
            args: ArgKind::Free,
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn aliases(mut self, aliases: &[&'static str]) -> Self {
        self.aliases = aliases.to_vec();
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn heavy(mut self) -> Self {
        self.heavy = true;
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.owner_only = true;
        self
    }

    pub fn group_only(mut self) -> Self {
        self.requires_group = true;
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.requires_admin = true;
        self
    }

    pub fn needs_media(mut self) -> Self {
        self.requires_media = true;
        self
    }

    pub fn args(mut self, kind: ArgKind) -> Self {
        self.args = kind;
        self
    }

    /// Check the group, admin and media requirements against a message.
    pub fn check_context(&self, message: &InboundMessage) -> Result<(), String> {
        if self.requires_group && !message.is_group {
            return Err("This command can only be used in groups.".into());
        }
        if self.requires_admin && !(message.is_group && message.sender_is_admin) {
            return Err("This command requires group admin rights.".into());
        }
        if self.requires_media && !message.has_media {
            return Err("Please send or reply to a media message with this command.".into());
        }
        Ok(())
    }
}

/// Errors a handler may return.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Wrong arguments; the usage text is shown to the user.
    #[error("usage: {0}")]
    Usage(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CommandError {
    /// Faults whose text suggests an attack are fed to the suspicious
    /// activity tracker.
    pub fn is_security_relevant(&self) -> bool {
        let text = self.to_string().to_lowercase();
        ["injection", "attack"].iter().any(|needle| text.contains(needle))
    }
}

/// Everything a handler can see and do for one invocation.
pub struct CommandContext {
    pub message: InboundMessage,
    pub command: ParsedCommand,
    pub prefix: String,
    pub bot_name: String,
    pub security: Arc<SecurityManager>,
    pub commands: Arc<CommandRegistry>,
    sink: Arc<dyn ReplySink>,
}

impl CommandContext {
    pub fn new(
        message: InboundMessage,
        command: ParsedCommand,
        prefix: String,
        bot_name: String,
        security: Arc<SecurityManager>,
        commands: Arc<CommandRegistry>,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            message,
            command,
            prefix,
            bot_name,
            security,
            commands,
            sink,
        }
    }

    pub fn sender(&self) -> &str {
        &self.message.sender
    }

    pub fn args(&self) -> &[String] {
        &self.command.args
    }

    /// Reply in the chat the command came from.
    pub async fn reply(&self, text: &str) -> Result<(), TransportError> {
        self.sink.reply(&self.message.chat_id, text).await
    }

    pub async fn react(&self, emoji: &str) -> Result<(), TransportError> {
        self.sink.react(&self.message.chat_id, emoji).await
    }
}

/// A chat command.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    fn descriptor(&self) -> &CommandDescriptor;

    /// Context precondition run right before execution. The default checks
    /// the descriptor's group, admin and media flags.
    fn validate(&self, ctx: &CommandContext) -> Result<(), String> {
        self.descriptor().check_context(&ctx.message)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), CommandError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command name or alias {0:?} is already registered")]
    Duplicate(String),
}

/// Name and alias lookup for registered commands.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Arc<dyn Command>>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its name and every alias.
    pub fn register(&mut self, command: Arc<dyn Command>) -> Result<(), RegistryError> {
        let desc = command.descriptor();
        let keys: Vec<String> = std::iter::once(desc.name)
            .chain(desc.aliases.iter().copied())
            .map(str::to_lowercase)
            .collect();
        if let Some(taken) = keys.iter().find(|k| self.index.contains_key(k.as_str())) {
            warn!(command = desc.name, key = %taken, "duplicate command registration");
            return Err(RegistryError::Duplicate(taken.clone()));
        }
        let slot = self.commands.len();
        for key in keys {
            self.index.insert(key, slot);
        }
        self.commands.push(command);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.index
            .get(&name.to_lowercase())
            .map(|&slot| Arc::clone(&self.commands[slot]))
    }

    /// Descriptors grouped by category, then name.
    pub fn descriptors(&self) -> Vec<&CommandDescriptor> {
        let mut all: Vec<&CommandDescriptor> =
            self.commands.iter().map(|c| c.descriptor()).collect();
        all.sort_by(|a, b| a.category.cmp(b.category).then(a.name.cmp(b.name)));
        all
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(CommandDescriptor);

    #[async_trait]
    impl Command for Noop {
        fn descriptor(&self) -> &CommandDescriptor {
            &self.0
        }
        async fn execute(&self, _ctx: &CommandContext) -> Result<(), CommandError> {
            Ok(())
        }
    }

    fn noop(desc: CommandDescriptor) -> Arc<dyn Command> {
        Arc::new(Noop(desc))
    }

    #[test]
    fn resolves_names_and_aliases_case_insensitively() {
        let mut reg = CommandRegistry::new();
        reg.register(noop(CommandDescriptor::new("sticker", "media").aliases(&["s", "stiker"])))
            .unwrap();
        assert_eq!(reg.resolve("STICKER").unwrap().descriptor().name, "sticker");
        assert_eq!(reg.resolve("s").unwrap().descriptor().name, "sticker");
        assert!(reg.resolve("nope").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_alias_rejected() {
        let mut reg = CommandRegistry::new();
        reg.register(noop(CommandDescriptor::new("ping", "general"))).unwrap();
        let err = reg
            .register(noop(CommandDescriptor::new("pong", "general").aliases(&["Ping"])))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("ping".into()));
        assert!(reg.resolve("pong").is_none());
    }

    #[test]
    fn descriptors_sorted_by_category() {
        let mut reg = CommandRegistry::new();
        reg.register(noop(CommandDescriptor::new("zeta", "a"))).unwrap();
        reg.register(noop(CommandDescriptor::new("alpha", "b"))).unwrap();
        reg.register(noop(CommandDescriptor::new("beta", "a"))).unwrap();
        let names: Vec<_> = reg.descriptors().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["beta", "zeta", "alpha"]);
    }

    #[test]
    fn context_requirements() {
        let desc = CommandDescriptor::new("kick", "group").group_only().admin_only();
        let dm = InboundMessage::direct("6281", ".kick");
        assert!(desc.check_context(&dm).unwrap_err().contains("groups"));
        let member = InboundMessage::group("g@g.us", "6281", false, ".kick");
        assert!(desc.check_context(&member).unwrap_err().contains("admin"));
        let admin = InboundMessage::group("g@g.us", "6281", true, ".kick");
        assert!(desc.check_context(&admin).is_ok());

        let media = CommandDescriptor::new("sticker", "media").needs_media();
        assert!(media.check_context(&dm).is_err());
        let with_media = InboundMessage { has_media: true, ..dm };
        assert!(media.check_context(&with_media).is_ok());
    }

    #[test]
    fn security_relevant_faults() {
        assert!(CommandError::Failed("SQL Injection attempt".into()).is_security_relevant());
        assert!(CommandError::Failed("possible attack".into()).is_security_relevant());
        assert!(!CommandError::Failed("timeout".into()).is_security_relevant());
        assert!(!CommandError::Usage("calc <expr>".into()).is_security_relevant());
    }
}
