//! User-facing reply texts.

pub const MALICIOUS_INPUT: &str =
    "⚠️ Your message contains disallowed characters or patterns and was not processed.";

pub const ACCESS_PENDING: &str =
    "🔒 You don't have access to this bot yet. Please wait for the owner to approve you.";

pub const BUSY: &str =
    "⏳ The bot is busy processing other heavy requests. Please try again in a moment.";

pub const GENERIC_FAILURE: &str = "❌ Something went wrong while running that command.";

pub fn welcome(bot_name: &str, prefix: &str) -> String {
    format!(
        "👋 Hi! I'm {bot_name}.\n\
         Send {prefix}menu to see what I can do. \
         Some commands need the owner's approval before you can use them."
    )
}

pub fn blocked(reason: &str, remaining_minutes: u64) -> String {
    format!(
        "🚫 You are blocked from using this bot.\nReason: {reason}\nRemaining: {remaining_minutes} minute(s)"
    )
}

pub fn invalid_args(reason: &str) -> String {
    format!("❌ Invalid input: {reason}")
}

pub fn permission_denied(reason: &str) -> String {
    format!("⛔ Permission denied: {reason}")
}

pub fn rate_limited(retry_after_secs: u64) -> String {
    format!("⏱️ Too many requests. Try again in {retry_after_secs} second(s).")
}

pub fn usage(text: &str) -> String {
    format!("Usage: {text}")
}
