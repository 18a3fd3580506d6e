use anyhow::{bail, Result};
use wabot_types::{normalize, Identity, NormalizeRules};

/// Run the `wabot normalize` command.
pub fn run(id: &str, country_code: &str) -> Result<()> {
    let Some(identity) = Identity::parse(id) else {
        bail!("{id:?} contains no usable identifier");
    };
    let forms = normalize(id, &NormalizeRules::new(country_code));

    println!("Parsed as: {identity:?}");
    for (i, form) in forms.iter().enumerate() {
        let marker = if i == 0 { " (primary)" } else { "" };
        println!("  {form}{marker}");
    }
    Ok(())
}
