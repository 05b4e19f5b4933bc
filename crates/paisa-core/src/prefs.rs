//! Per-user preferences
//!
//! Aliases, spending limits, goals, and a bounded memory of recent
//! transactions. Preferences live in their own per-user store, independent
//! of the ledger: losing them degrades convenience, never correctness.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::alias::AliasResolver;
use crate::error::{Error, Result};
use crate::models::{Transaction, UserId};

/// How many recent transactions the context memory keeps per user.
const CONTEXT_MEMORY_CAP: usize = 100;

/// A savings or spending goal set by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub target: f64,
    pub description: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    pub created: NaiveDate,
}

/// One remembered transaction, used for context and shortcut suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub description: String,
    pub category: String,
    pub amount: f64,
}

/// A pinned quick-entry shortcut ("chai" -> 20 on food).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortcut {
    pub trigger: String,
    pub amount: f64,
    pub category: String,
    pub description: String,
}

/// Everything paisa remembers about one user outside the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Shorthand -> canonical category
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Category -> spend cap per report month
    #[serde(default)]
    pub spending_limits: HashMap<String, f64>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    /// Bounded recent-transaction memory, oldest first
    #[serde(default)]
    pub context_memory: Vec<ContextEntry>,
    #[serde(default)]
    pub shortcuts: Vec<Shortcut>,
}

impl UserPreferences {
    pub fn alias_resolver(&self) -> AliasResolver {
        AliasResolver::from_map(&self.aliases)
    }

    pub fn set_alias(&mut self, shorthand: &str, category: &str) {
        self.aliases
            .insert(shorthand.trim().to_lowercase(), category.trim().to_lowercase());
    }

    pub fn set_limit(&mut self, category: &str, cap: f64) {
        self.spending_limits.insert(category.trim().to_lowercase(), cap);
    }

    pub fn limit_for(&self, category: &str) -> Option<f64> {
        self.spending_limits.get(&category.trim().to_lowercase()).copied()
    }

    pub fn add_goal(&mut self, target: f64, description: &str, deadline: Option<NaiveDate>, created: NaiveDate) {
        self.goals.push(Goal {
            target,
            description: description.to_string(),
            deadline,
            created,
        });
    }

    /// Record a committed transaction in the bounded context memory.
    pub fn remember(&mut self, tx: &Transaction) {
        self.context_memory.push(ContextEntry {
            description: tx.description.clone(),
            category: tx.category.clone(),
            amount: tx.amount,
        });
        if self.context_memory.len() > CONTEXT_MEMORY_CAP {
            let overflow = self.context_memory.len() - CONTEXT_MEMORY_CAP;
            self.context_memory.drain(..overflow);
        }
    }

    /// Distinct categories from the context memory, most recent first.
    pub fn recent_categories(&self, limit: usize) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in self.context_memory.iter().rev() {
            if !seen.contains(&entry.category) {
                seen.push(entry.category.clone());
                if seen.len() == limit {
                    break;
                }
            }
        }
        seen
    }
}

/// Load/save interface to the per-user preference store.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Load a user's preferences; first interaction yields the default set.
    async fn load(&self, user: UserId) -> Result<UserPreferences>;

    async fn save(&self, user: UserId, prefs: &UserPreferences) -> Result<()>;
}

/// JSON-file-per-user store under the platform data directory.
pub struct FilePreferenceStore {
    dir: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Store under `~/.local/share/paisa/prefs` (or the platform equivalent).
    pub fn default_location() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| Error::Config("no platform data directory".into()))?
            .join("paisa")
            .join("prefs");
        Ok(Self::new(dir))
    }

    fn path_for(&self, user: UserId) -> PathBuf {
        self.dir.join(format!("user_{}.json", user))
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn load(&self, user: UserId) -> Result<UserPreferences> {
        let path = self.path_for(user);
        if !path.exists() {
            debug!(user, "No preference file yet, starting fresh");
            return Ok(UserPreferences::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn save(&self, user: UserId, prefs: &UserPreferences) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(prefs)?;
        std::fs::write(self.path_for(user), contents)?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    prefs: RwLock<HashMap<UserId, UserPreferences>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self, user: UserId) -> Result<UserPreferences> {
        Ok(self.prefs.read().await.get(&user).cloned().unwrap_or_default())
    }

    async fn save(&self, user: UserId, prefs: &UserPreferences) -> Result<()> {
        self.prefs.write().await.insert(user, prefs.clone());
        Ok(())
    }
}
