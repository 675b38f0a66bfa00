use crate::workspace::Workspace;
use anyhow::{bail, Result};
use clap::Subcommand;
use qset_core::QsetConfig;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

pub fn execute_config_command(workspace: &Workspace, path: &Path, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", workspace.config.to_toml()?);
        }

        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", path.display());
            }
            QsetConfig::default().save(path)?;
            println!("✓ Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}
