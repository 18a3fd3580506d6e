use std::path::Path;

use anyhow::{bail, Context, Result};
use wabot_types::WabotConfig;

/// Run the `wabot init` command.
pub fn run(path: &Path, owners: &[String], force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let owners: Vec<&str> = owners.iter().map(String::as_str).collect();
    let config = WabotConfig::with_owners(&owners);
    config.validate().context("invalid owner identifier")?;
    let text = config.to_toml()?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_config_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabot.toml");
        run(&path, &["628111000111".to_string()], false).unwrap();

        let loaded = WabotConfig::from_toml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.bot.owners, vec!["628111000111"]);

        assert!(run(&path, &["628111000111".to_string()], false).is_err());
        assert!(run(&path, &["628222".to_string()], true).is_ok());
    }

    #[test]
    fn rejects_owner_without_digits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabot.toml");
        assert!(run(&path, &["nobody".to_string()], false).is_err());
        assert!(!path.exists());
    }
}
