//! Owner control surface.
//!
//! These commands are thin wrappers over the [`SecurityManager`] admin hooks.
//! Every descriptor carries the owner-only flag, so they stay owner-only
//! whatever `owner_only_commands` is configured to. Owner-protection refusals
//! (blocking or revoking an owner) come back as typed errors and are shown
//! verbatim.
//!
//! [`SecurityManager`]: wabot_guard::SecurityManager

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use wabot_guard::FEATURE_NAMES;

use crate::command::{
    Command, CommandContext, CommandDescriptor, CommandError, CommandRegistry, RegistryError,
};

const CATEGORY: &str = "owner";
const DEFAULT_BLOCK_REASON: &str = "Blocked by owner";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdminAction {
    Block,
    Unblock,
    UnblockAll,
    ListBlocked,
    Allow,
    Revoke,
    ListAllowed,
    Toggle,
    Stats,
}

impl AdminAction {
    const ALL: [AdminAction; 9] = [
        AdminAction::Block,
        AdminAction::Unblock,
        AdminAction::UnblockAll,
        AdminAction::ListBlocked,
        AdminAction::Allow,
        AdminAction::Revoke,
        AdminAction::ListAllowed,
        AdminAction::Toggle,
        AdminAction::Stats,
    ];

    fn descriptor(self) -> CommandDescriptor {
        let (name, description) = match self {
            AdminAction::Block => ("block", "block a user: <id> [minutes] [reason]"),
            AdminAction::Unblock => ("unblock", "lift a block: <id>"),
            AdminAction::UnblockAll => ("unblockall", "lift every block"),
            AdminAction::ListBlocked => ("listblock", "list blocked users"),
            AdminAction::Allow => ("allow", "grant access: <id>"),
            AdminAction::Revoke => ("revoke", "remove access: <id>"),
            AdminAction::ListAllowed => ("listallow", "list allowed users"),
            AdminAction::Toggle => ("toggle", "switch a feature: <name> <on|off>"),
            AdminAction::Stats => ("stats", "security counters"),
        };
        CommandDescriptor::new(name, CATEGORY)
            .describe(description)
            .owner_only()
    }
}

pub struct AdminCommand {
    action: AdminAction,
    desc: CommandDescriptor,
}

impl AdminCommand {
    fn new(action: AdminAction) -> Self {
        Self {
            action,
            desc: action.descriptor(),
        }
    }
}

/// Register every owner command.
pub fn register_admin(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    for action in AdminAction::ALL {
        registry.register(Arc::new(AdminCommand::new(action)))?;
    }
    Ok(())
}

/// A target id as typed in chat; a leading `@` from a mention is dropped.
fn target(ctx: &CommandContext, usage: &str) -> Result<String, CommandError> {
    ctx.args()
        .first()
        .map(|id| id.trim_start_matches('@').to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CommandError::Usage(format!("{}{usage}", ctx.prefix)))
}

#[async_trait]
impl Command for AdminCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.desc
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), CommandError> {
        let sec = &ctx.security;
        let reply = match self.action {
            AdminAction::Block => {
                let id = target(ctx, "block <id> [minutes] [reason]")?;
                let rest = &ctx.args()[1..];
                let (minutes, reason_words) = match rest.first().map(|m| m.parse::<u64>()) {
                    Some(Ok(m)) if m > 0 => (Some(m), &rest[1..]),
                    _ => (None, rest),
                };
                let reason = if reason_words.is_empty() {
                    DEFAULT_BLOCK_REASON.to_string()
                } else {
                    reason_words.join(" ")
                };
                match sec.block_for_minutes(&id, minutes, &reason) {
                    Ok(receipt) => {
                        info!(target: "security", by = ctx.sender(), id = %receipt.blocked_id, "owner blocked user");
                        let mins = minutes.unwrap_or_else(|| sec.default_block().as_secs() / 60);
                        format!(
                            "✅ Blocked {} for {mins} minute(s).\nReason: {reason}",
                            receipt.blocked_id
                        )
                    }
                    Err(e) => format!("❌ {e}"),
                }
            }
            AdminAction::Unblock => {
                let id = target(ctx, "unblock <id>")?;
                if sec.unblock(&id) {
                    format!("✅ Unblocked {id}.")
                } else {
                    format!("ℹ️ {id} is not blocked.")
                }
            }
            AdminAction::UnblockAll => {
                let removed = sec.unblock_all();
                format!("✅ Cleared {removed} block entr{}.", if removed == 1 { "y" } else { "ies" })
            }
            AdminAction::ListBlocked => {
                let rows = sec.list_blocked();
                if rows.is_empty() {
                    "No blocked users.".to_string()
                } else {
                    let mut out = format!("🚫 Blocked users ({}):\n", rows.len());
                    for row in rows {
                        let _ = writeln!(
                            out,
                            "• {} - {} ({} min left)",
                            row.id, row.reason, row.remaining_minutes
                        );
                    }
                    out
                }
            }
            AdminAction::Allow => {
                let id = target(ctx, "allow <id>")?;
                match sec.allow(&id, ctx.sender()) {
                    Ok(canonical) => format!("✅ {canonical} can now use the bot."),
                    Err(e) => format!("❌ {e}"),
                }
            }
            AdminAction::Revoke => {
                let id = target(ctx, "revoke <id>")?;
                match sec.revoke(&id) {
                    Ok(canonical) => format!("✅ Access revoked for {canonical}."),
                    Err(e) => format!("❌ {e}"),
                }
            }
            AdminAction::ListAllowed => {
                let entries = sec.list_allowed();
                if entries.is_empty() {
                    "No allowed users.".to_string()
                } else {
                    let mut out = format!("✅ Allowed users ({}):\n", entries.len());
                    for entry in entries {
                        let _ = writeln!(
                            out,
                            "• {} (since {})",
                            entry.id,
                            entry.allowed_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                    out
                }
            }
            AdminAction::Toggle => {
                let usage = || {
                    CommandError::Usage(format!(
                        "{}toggle <{}> <on|off>",
                        ctx.prefix,
                        FEATURE_NAMES.join("|")
                    ))
                };
                let (Some(name), Some(state)) = (ctx.args().first(), ctx.args().get(1)) else {
                    return Err(usage());
                };
                let on = match state.to_lowercase().as_str() {
                    "on" | "true" | "1" | "enable" => true,
                    "off" | "false" | "0" | "disable" => false,
                    _ => return Err(usage()),
                };
                match sec.toggle_feature(name, on) {
                    Ok(_) => format!("✅ {name} is now {}.", if on { "on" } else { "off" }),
                    Err(e) => format!("❌ {e}"),
                }
            }
            AdminAction::Stats => {
                let stats = sec.stats();
                let features = sec.features().snapshot();
                let mut out = format!(
                    "📊 Security stats\n\
                     Blocked: {}\nAllowed: {}\nRegistered: {}\nSuspicious tracked: {}\n\
                     Owner-only chat: {}\nChat filter: {}\nHeavy in flight: {}/{}",
                    stats.blocked,
                    stats.allowed,
                    stats.registered,
                    stats.suspicious_tracked,
                    on_off(features.owner_only_chat),
                    on_off(features.chat_filter),
                    sec.throttle().in_flight(),
                    sec.throttle().max(),
                );
                if !stats.recent_blocks.is_empty() {
                    out.push_str("\n\nRecent blocks:");
                    for row in &stats.recent_blocks {
                        let _ = write!(out, "\n• {} - {}", row.id, row.reason);
                    }
                }
                out
            }
        };
        ctx.reply(reply.trim_end()).await?;
        Ok(())
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
