//! The admission pipeline.
//!
//! [`Dispatcher::handle_inbound`] runs one message through every gate in a
//! fixed order and, if all pass, executes the resolved command. Each exit
//! either replies with a specific message or drops silently; handler errors
//! and panics are caught here and never reach the transport.
//!
//! Gate order:
//!
//! 1. owner-only chat mode drops private chats from non-owners
//! 2. first contact registers the sender and sends the welcome once
//! 3. blocked senders are told why and for how long
//! 4. text is sanitized and must carry the command prefix
//! 5. the chat filter screens for injection patterns
//! 6. the allow-list is checked before the command is resolved, so
//!    unapproved users get the same answer for real and unknown commands
//! 7. unknown commands are dropped
//! 8. arguments, permissions, rate limit, cooldown and heavy ceiling
//! 9. the command's own context check, then execution

use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};
use wabot_guard::{validate_args, ActivityKind, PermissionDenied, SecurityManager};
use wabot_types::WabotConfig;

use crate::command::{Command, CommandContext, CommandError, CommandRegistry};
use crate::messages;
use crate::transport::{InboundMessage, ReplySink};

/// How a message left the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Dropped by owner-only chat mode.
    OwnerOnlyChat,
    /// Sender is blocked; told so.
    Blocked,
    /// No command prefix or empty command.
    NotACommand,
    /// Chat filter matched an injection pattern.
    MaliciousInput { pattern: String },
    /// Sender is not on the allow-list.
    NotAllowed,
    /// Allowed sender, unknown command name.
    UnknownCommand,
    InvalidArguments { reason: String },
    PermissionDenied { reason: String },
    RateLimited { retry_after_secs: u64 },
    /// Per-user cooldown still active.
    CoolingDown,
    /// Heavy-command ceiling reached.
    Busy,
    /// The command's own context check failed.
    PreconditionFailed { reason: String },
    Completed,
    /// The handler returned an error or panicked.
    Failed,
}

impl Outcome {
    /// Whether the sender got no reply from the pipeline itself.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            Outcome::OwnerOnlyChat
                | Outcome::NotACommand
                | Outcome::UnknownCommand
                | Outcome::CoolingDown
        )
    }
}

pub struct Dispatcher {
    bot_name: String,
    prefix: String,
    security: Arc<SecurityManager>,
    commands: Arc<CommandRegistry>,
    sink: Arc<dyn ReplySink>,
}

impl Dispatcher {
    /// Build a dispatcher. Any block held by an owner is cleared first.
    pub fn new(
        config: &WabotConfig,
        security: Arc<SecurityManager>,
        commands: CommandRegistry,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        let cleared = security.blocks().clear_owner_blocks();
        info!(
            commands = commands.len(),
            owners = security.owners().raw_ids().len(),
            cleared_owner_blocks = cleared,
            "dispatcher ready"
        );
        Self {
            bot_name: config.bot.name.clone(),
            prefix: config.bot.prefix.clone(),
            security,
            commands: Arc::new(commands),
            sink,
        }
    }

    pub fn security(&self) -> &Arc<SecurityManager> {
        &self.security
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    async fn send(&self, chat_id: &str, text: &str) {
        if let Err(e) = self.sink.reply(chat_id, text).await {
            warn!(chat = chat_id, error = %e, "failed to deliver reply");
        }
    }

    /// Run one inbound message through the pipeline.
    pub async fn handle_inbound(&self, msg: InboundMessage) -> Outcome {
        let sec = &self.security;
        let sender = msg.sender.as_str();
        let chat = msg.chat_id.as_str();

        if sec.features().owner_only_chat() && !msg.is_group && !sec.is_owner(sender) {
            debug!(sender, "owner-only chat mode, dropping private message");
            return Outcome::OwnerOnlyChat;
        }

        let registry = sec.registry();
        if registry.register_if_new(sender) && !registry.was_greeting_sent(sender) {
            self.send(chat, &messages::welcome(&self.bot_name, &self.prefix))
                .await;
            registry.mark_greeting_sent(sender);
            info!(sender, "new user registered");
        }

        if let Some(info) = sec.blocks().block_info(sender) {
            info!(target: "security", sender, reason = %info.reason, "blocked sender");
            self.send(chat, &messages::blocked(&info.reason, info.remaining_minutes))
                .await;
            return Outcome::Blocked;
        }

        let text = wabot_guard::sanitize_input(&msg.text, sec.max_input_len());
        let Some(parsed) = wabot_guard::parse_command(&text, &self.prefix) else {
            return Outcome::NotACommand;
        };
        let name = parsed.name.clone();

        if sec.features().chat_filter() {
            let detection = sec.detector().detect(&text);
            if detection.is_malicious {
                let pattern = detection.pattern.unwrap_or("unknown").to_string();
                warn!(
                    target: "security",
                    sender,
                    command = %name,
                    event = "malicious_pattern",
                    reason = %pattern,
                    matched = ?detection.matched,
                    "malicious input detected"
                );
                sec.track(sender, ActivityKind::MaliciousPattern);
                self.send(chat, messages::MALICIOUS_INPUT).await;
                return Outcome::MaliciousInput { pattern };
            }
        }

        let command = self.commands.resolve(&name);

        if !registry.is_allowed(sender) {
            info!(target: "security", sender, command = %name, "sender not on allow-list");
            self.send(chat, messages::ACCESS_PENDING).await;
            return Outcome::NotAllowed;
        }

        let Some(command) = command else {
            debug!(sender, command = %name, "unknown command");
            return Outcome::UnknownCommand;
        };
        let desc = command.descriptor();

        if let Err(e) = validate_args(desc.args, &parsed.rest) {
            let reason = e.to_string();
            warn!(target: "security", sender, command = desc.name, event = "invalid_arguments", reason = %reason, "argument validation failed");
            self.send(chat, &messages::invalid_args(&reason)).await;
            return Outcome::InvalidArguments { reason };
        }

        let permitted = if desc.owner_only && !sec.is_owner(sender) {
            Err(PermissionDenied::OwnerOnly)
        } else {
            sec.permissions()
                .check(sender, desc.name, msg.is_group, msg.sender_is_admin)
        };
        if let Err(denied) = permitted {
            let reason = denied.to_string();
            warn!(target: "security", sender, command = desc.name, event = "permission_denied", reason = %reason, "permission denied");
            self.send(chat, &messages::permission_denied(&reason)).await;
            return Outcome::PermissionDenied { reason };
        }

        let user_key = sec.user_key(sender);
        let decision = sec.rate_limiter().check(&user_key);
        if !decision.allowed {
            warn!(
                target: "security",
                sender,
                command = desc.name,
                event = "rate_limit_exceeded",
                retry_after_secs = decision.retry_after_secs,
                "rate limited"
            );
            sec.track(sender, ActivityKind::RateLimitExceeded);
            self.send(chat, &messages::rate_limited(decision.retry_after_secs))
                .await;
            return Outcome::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            };
        }

        let cooldown = desc.cooldown.unwrap_or_else(|| sec.default_cooldown());
        if !sec.cooldowns().try_enter(&user_key, cooldown) {
            debug!(sender, command = desc.name, "cooldown active, dropping");
            return Outcome::CoolingDown;
        }

        let _permit = if desc.heavy {
            match sec.throttle().try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    info!(
                        sender,
                        command = desc.name,
                        in_flight = sec.throttle().in_flight(),
                        "heavy command ceiling reached"
                    );
                    self.send(chat, messages::BUSY).await;
                    return Outcome::Busy;
                }
            }
        } else {
            None
        };

        let ctx = CommandContext::new(
            msg.clone(),
            parsed,
            self.prefix.clone(),
            self.bot_name.clone(),
            Arc::clone(sec),
            Arc::clone(&self.commands),
            Arc::clone(&self.sink),
        );

        if let Err(reason) = command.validate(&ctx) {
            debug!(sender, command = desc.name, reason = %reason, "command precondition failed");
            self.send(chat, &reason).await;
            return Outcome::PreconditionFailed { reason };
        }

        self.execute(command.as_ref(), &ctx).await
    }

    async fn execute(&self, command: &dyn Command, ctx: &CommandContext) -> Outcome {
        let name = command.descriptor().name;
        let sender = ctx.sender();
        let started = Instant::now();

        let result = std::panic::AssertUnwindSafe(command.execute(ctx))
            .catch_unwind()
            .await;
        let ok = matches!(result, Ok(Ok(())));

        match result {
            Ok(Ok(())) => {}
            Ok(Err(CommandError::Usage(usage))) => {
                info!(command = name, sender, usage = %usage, "command rejected its arguments");
                self.send(&ctx.message.chat_id, &messages::usage(&usage)).await;
            }
            Ok(Err(e)) => {
                error!(command = name, sender, error = %e, "command failed");
                if e.is_security_relevant() {
                    self.security.track(sender, ActivityKind::HandlerFault);
                }
                self.send(&ctx.message.chat_id, messages::GENERIC_FAILURE).await;
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(command = name, sender, panic = %detail, "command panicked");
                self.send(&ctx.message.chat_id, messages::GENERIC_FAILURE).await;
            }
        }

        info!(
            command = name,
            sender,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok,
            "command finished"
        );
        if ok {
            Outcome::Completed
        } else {
            Outcome::Failed
        }
    }
}
