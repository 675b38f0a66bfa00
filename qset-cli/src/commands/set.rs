use crate::workspace::Workspace;
use anyhow::{Context, Result};
use clap::Subcommand;
use qset_core::{MemorySetStore, SetStore};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum SetCommands {
    /// List all query sets
    List,
    /// Print a query set as JSON
    Show {
        /// Set name
        name: String,
    },
    /// Check set files without running them
    Validate {
        /// Set file paths
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

pub fn execute_set_command(workspace: &Workspace, command: SetCommands) -> Result<()> {
    match command {
        SetCommands::List => {
            let sets = workspace.set_store()?;
            let names = sets.get_set_names()?;
            if names.is_empty() {
                println!("No query sets in {}", workspace.config.sets.dir.display());
                return Ok(());
            }

            println!("{:<32} {:<8} {:>6}  {}", "NAME", "ENABLED", "STAGES", "DESCRIPTION");
            println!("{}", "-".repeat(72));
            for name in names {
                let set = sets.get_set_by_name(&name)?;
                println!(
                    "{:<32} {:<8} {:>6}  {}",
                    set.name,
                    if set.enabled { "yes" } else { "no" },
                    set.queries.len(),
                    set.desc
                );
            }
        }

        SetCommands::Show { name } => {
            let set = workspace.set_store()?.get_set_by_name(&name)?;
            println!("{}", set.to_json_pretty()?);
        }

        SetCommands::Validate { files } => {
            let max_stages = workspace.config.execution.max_stages;
            let mut failed = 0;

            for file in &files {
                let checked = MemorySetStore::read_file(file)
                    .map_err(anyhow::Error::from)
                    .and_then(|set| {
                        set.validate(max_stages)
                            .with_context(|| format!("set {:?}", set.name))?;
                        Ok(set)
                    });

                match checked {
                    Ok(set) => println!(
                        "✓ {}: {} ({} stages{})",
                        file.display(),
                        set.name,
                        set.queries.len(),
                        if set.enabled { "" } else { ", disabled" }
                    ),
                    Err(e) => {
                        failed += 1;
                        println!("✗ {}: {:#}", file.display(), e);
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{} of {} set files are invalid", failed, files.len());
            }
        }
    }

    Ok(())
}
