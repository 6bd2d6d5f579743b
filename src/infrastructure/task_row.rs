use crate::domain::models::{Recurrence, Settings, Task, TaskId, Theme};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub recurring: Option<Recurrence>,
    #[serde(default)]
    pub time_spent: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub pomodoro_sessions: i32,
    #[serde(default)]
    pub order_index: i64,
}

impl TaskRow {
    pub fn for_insert(task: &Task, user_id: &str) -> Self {
        Self {
            id: None,
            created_at: None,
            ..Self::from_task(task, user_id)
        }
    }

    pub fn for_upsert(task: &Task, user_id: &str) -> Result<Self, InfraError> {
        let TaskId::Durable(id) = &task.id else {
            return Err(InfraError::Validation(format!(
                "task {} has no durable id yet",
                task.id
            )));
        };
        Ok(Self {
            id: Some(id.clone()),
            ..Self::from_task(task, user_id)
        })
    }

    fn from_task(task: &Task, user_id: &str) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            title: task.title.clone(),
            completed: task.completed,
            created_at: Some(task.created_at),
            scheduled_date: task.scheduled_date,
            recurring: task.recurring,
            time_spent: i64::try_from(task.time_spent).unwrap_or(i64::MAX),
            started_at: task.started_at,
            completed_at: task.completed_at,
            notes: task.notes.clone(),
            pomodoro_sessions: i32::try_from(task.pomodoro_sessions).unwrap_or(i32::MAX),
            order_index: task.order,
        }
    }

    pub fn into_task(self) -> Result<Task, InfraError> {
        let id = self
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::Remote("task row is missing id".to_string()))?;
        let created_at = self
            .created_at
            .ok_or_else(|| InfraError::Remote(format!("task row {id} is missing created_at")))?;
        let completed_at = if self.completed {
            Some(self.completed_at.unwrap_or(created_at))
        } else {
            None
        };

        Ok(Task {
            id: TaskId::durable(id),
            title: self.title,
            completed: self.completed,
            created_at,
            scheduled_date: self.scheduled_date,
            recurring: self.recurring,
            time_spent: u64::try_from(self.time_spent).unwrap_or(0),
            started_at: if self.completed { None } else { self.started_at },
            completed_at,
            notes: self.notes,
            pomodoro_sessions: u32::try_from(self.pomodoro_sessions).unwrap_or(0),
            order: self.order_index,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsRow {
    pub user_id: String,
    pub theme: String,
    pub daily_goal: i64,
}

impl SettingsRow {
    pub fn from_settings(settings: &Settings, user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            theme: settings.theme.as_str().to_string(),
            daily_goal: i64::from(settings.daily_goal),
        }
    }

    pub fn into_settings(self) -> Settings {
        let mut settings = Settings::default();
        if let Some(theme) = Theme::parse(&self.theme) {
            settings.set_theme(theme);
        }
        settings.set_daily_goal(self.daily_goal);
        settings
    }
}
