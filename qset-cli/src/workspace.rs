use anyhow::{Context, Result};
use qset_core::config::LogLevel;
use qset_core::monitoring::init_logging;
use qset_core::{Engine, MemorySetStore, MemoryStore, QsetConfig};
use std::path::Path;
use tracing::info;

/// Configuration plus the stores built from it
pub struct Workspace {
    pub config: QsetConfig,
}

impl Workspace {
    /// Load the config file and install logging
    pub fn load(path: &Path, verbose: bool) -> Result<Self> {
        let mut config = QsetConfig::load(path)?;
        if verbose {
            config.logging.level = LogLevel::Debug;
        }
        init_logging(&config.logging)?;

        Ok(Self { config })
    }

    pub fn set_store(&self) -> Result<MemorySetStore> {
        let sets = MemorySetStore::new(self.config.execution.max_stages);
        let dir = &self.config.sets.dir;
        if dir.exists() {
            sets.load_dir(dir)
                .with_context(|| format!("Failed to load sets from {}", dir.display()))?;
        } else {
            info!(dir = %dir.display(), "set directory not found");
        }
        Ok(sets)
    }

    pub fn document_store(&self) -> Result<MemoryStore> {
        let store = MemoryStore::new();
        let dir = &self.config.store.dir;
        if dir.exists() {
            store
                .load_dir(dir)
                .with_context(|| format!("Failed to load collections from {}", dir.display()))?;
        } else {
            info!(dir = %dir.display(), "data directory not found");
        }
        Ok(store)
    }

    pub fn engine(&self) -> Result<Engine<MemorySetStore, MemoryStore>> {
        Ok(Engine::with_settings(
            self.set_store()?,
            self.document_store()?,
            &self.config.execution,
        ))
    }
}
