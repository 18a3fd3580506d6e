use std::path::Path;

use anyhow::{Context, Result};
use wabot_types::WabotConfig;

/// Run the `wabot check-config` command.
pub fn run(path: &Path) -> Result<()> {
    let config = WabotConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let owners = config.owner_set();

    println!("Config: {} OK", path.display());
    println!("{}", "-".repeat(40));
    println!("  Bot name:        {}", config.bot.name);
    println!("  Prefix:          {}", config.bot.prefix);
    println!("  Owners:          {}", config.bot.owners.join(", "));
    println!("  Owner forms:     {}", owners.forms().len());
    println!(
        "  Rate limit:      {} per {} ms",
        config.limits.rate_limit_max, config.limits.rate_limit_window_ms
    );
    println!("  Default cooldown {} ms", config.limits.default_cooldown_ms);
    println!("  Heavy ceiling:   {}", config.limits.max_heavy_concurrency);
    println!(
        "  Auto block:      > {} events / {} s for {} min",
        config.security.suspicious_threshold,
        config.security.suspicious_window_secs,
        config.security.auto_block_minutes
    );
    println!(
        "  Owner-only cmds: {}",
        config.security.owner_only_commands.join(", ")
    );
    println!(
        "  Features:        owner_only_chat={} chat_filter={}",
        config.features.owner_only_chat, config.features.chat_filter
    );
    Ok(())
}
