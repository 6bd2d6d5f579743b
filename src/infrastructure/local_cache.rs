use crate::domain::models::{Settings, Task, Theme};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TASKS_KEY: &str = "tasks";
pub const THEME_KEY: &str = "theme";
pub const DAILY_GOAL_KEY: &str = "dailyGoal";

pub trait FallbackCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;

    fn load_tasks(&self) -> Result<Option<Vec<Task>>, InfraError> {
        let Some(raw) = self.get(TASKS_KEY)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save_tasks(&self, tasks: &[Task]) -> Result<(), InfraError> {
        self.set(TASKS_KEY, &serde_json::to_string(tasks)?)
    }

    fn load_settings(&self) -> Result<Option<Settings>, InfraError> {
        let theme = self.get(THEME_KEY)?;
        let goal = self.get(DAILY_GOAL_KEY)?;
        if theme.is_none() && goal.is_none() {
            return Ok(None);
        }

        let mut settings = Settings::default();
        if let Some(theme) = theme.as_deref().and_then(Theme::parse) {
            settings.set_theme(theme);
        }
        if let Some(goal) = goal.and_then(|raw| raw.trim().parse::<i64>().ok()) {
            settings.set_daily_goal(goal);
        }
        Ok(Some(settings))
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), InfraError> {
        self.set(THEME_KEY, settings.theme.as_str())?;
        self.set(DAILY_GOAL_KEY, &settings.daily_goal.to_string())
    }

    fn clear_all(&self) -> Result<(), InfraError> {
        for key in [TASKS_KEY, THEME_KEY, DAILY_GOAL_KEY] {
            self.remove(key)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteFallbackCache {
    db_path: PathBuf,
}

impl SqliteFallbackCache {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_database(&self.db_path)
    }
}

impl FallbackCache for SqliteFallbackCache {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value = connection
            .query_row(
                "SELECT value FROM local_cache WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO local_cache (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM local_cache WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFallbackCache {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryFallbackCache {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::StateLock(format!("fallback cache lock poisoned: {error}")))
    }
}

impl FallbackCache for InMemoryFallbackCache {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
