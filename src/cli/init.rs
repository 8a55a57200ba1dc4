use std::path::PathBuf;

use crate::error::Result;
use crate::rules::DEFAULT_RULES;
use crate::settings::{config_dir, save_settings, settings_file_exists, shellexpand_path, Settings};

pub fn run(settings: &Settings, force: bool) -> Result<()> {
    if settings_file_exists() {
        println!("Settings already exist in {}", config_dir().display());
    } else {
        save_settings(settings)?;
        println!("Wrote settings to {}", config_dir().join("settings.json").display());
    }

    let rules_path = PathBuf::from(shellexpand_path(&settings.rules_path));
    if rules_path.exists() && !force {
        println!(
            "Rule table {} already exists (use --force to replace it)",
            rules_path.display()
        );
        return Ok(());
    }
    if let Some(parent) = rules_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&rules_path, DEFAULT_RULES)?;
    println!("Wrote starter rule table to {}", rules_path.display());
    Ok(())
}
