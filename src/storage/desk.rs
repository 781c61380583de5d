//! Desk management
//!
//! A desk is a directory holding `.circulation/`. Opening one builds every
//! store the circulation core needs; nothing is global.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::{Config, DeskConfig, JsonlHistory, OutboxNotifier, SqliteStore};
use crate::domain::Policy;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("Not in a circulation desk. Run 'circ init' first.")]
    NotInDesk,
}

/// An open circulation desk
pub struct Desk {
    root: PathBuf,
    config: Config,
    store: SqliteStore,
    history: JsonlHistory,
    notifier: OutboxNotifier,
}

impl Desk {
    /// Opens an existing desk at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let desk_dir = root.join(".circulation");

        if !desk_dir.is_dir() {
            return Err(DeskError::NotInDesk.into());
        }

        let config = Config::for_desk(&root)?;
        let db_path = desk_dir.join("desk.db");
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open desk database: {}", db_path.display()))?;

        Ok(Self {
            history: JsonlHistory::for_desk(&root),
            notifier: OutboxNotifier::for_desk(&root),
            root,
            config,
            store,
        })
    }

    /// Opens the desk at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_desk_root().ok_or(DeskError::NotInDesk)?;

        Self::open(root)
    }

    /// Initializes a new desk at the given path.
    ///
    /// Safe to run twice: existing config and policies are left alone.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let desk_dir = root.join(".circulation");

        fs::create_dir_all(&desk_dir).with_context(|| {
            format!(
                "Failed to create .circulation directory: {}",
                desk_dir.display()
            )
        })?;

        if !desk_dir.join("config.toml").exists() {
            Config::write_desk_config(&root, &DeskConfig::default())?;
        }

        let desk = Self::open(root)?;

        let seeded = desk
            .store
            .list_policies()
            .context("Failed to read policies")?;
        if seeded.is_empty() {
            for policy in Policy::defaults() {
                desk.store
                    .upsert_policy(&policy)
                    .with_context(|| format!("Failed to seed {} policy", policy.category))?;
            }
        }

        Ok(desk)
    }

    /// Returns the desk root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .circulation directory path
    pub fn desk_dir(&self) -> PathBuf {
        self.root.join(".circulation")
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the record store
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn history(&self) -> &JsonlHistory {
        &self.history
    }

    pub fn notifier(&self) -> &OutboxNotifier {
        &self.notifier
    }
}
