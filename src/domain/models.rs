use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_DAILY_GOAL: u32 = 5;

static NEXT_PROVISIONAL: AtomicU64 = AtomicU64::new(1);

/// Identity of a task.
///
/// A task starts out with a client-generated `Provisional` token while its
/// create call is in flight and carries the server-assigned `Durable` id once
/// the create is acknowledged. The two regimes never compare equal, even when
/// the underlying strings match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskId {
    Provisional(String),
    Durable(String),
}

impl TaskId {
    pub fn provisional(now: DateTime<Utc>) -> Self {
        let sequence = NEXT_PROVISIONAL.fetch_add(1, Ordering::Relaxed);
        Self::Provisional(format!("tmp-{}-{sequence}", now.timestamp_millis()))
    }

    pub fn durable(id: impl Into<String>) -> Self {
        Self::Durable(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Provisional(token) | Self::Durable(token) => token,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional(token) => write!(f, "provisional:{token}"),
            Self::Durable(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub scheduled_date: Option<NaiveDate>,
    pub recurring: Option<Recurrence>,
    pub time_spent: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub pomodoro_sessions: u32,
    pub order: i64,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(self.id.as_str(), "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.completed != self.completed_at.is_some() {
            return Err("task.completed_at must be set exactly when task.completed".to_string());
        }
        if self.completed && self.started_at.is_some() {
            return Err("completed task must not carry task.started_at".to_string());
        }
        Ok(())
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.scheduled_date.is_some_and(|date| date < today)
    }

    pub fn is_scheduled_for(&self, day: NaiveDate) -> bool {
        self.scheduled_date == Some(day)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    pub id: Option<TaskId>,
    pub title: String,
    pub scheduled_date: Option<NaiveDate>,
    pub recurring: Option<Recurrence>,
    pub notes: Option<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn scheduled(mut self, date: NaiveDate) -> Self {
        self.scheduled_date = Some(date);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub theme: Theme,
    pub daily_goal: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            daily_goal: DEFAULT_DAILY_GOAL,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        if self.daily_goal == 0 {
            return Err("settings.daily_goal must be > 0".to_string());
        }
        Ok(())
    }

    pub fn set_daily_goal(&mut self, goal: i64) -> bool {
        let Ok(goal) = u32::try_from(goal) else {
            return false;
        };
        if goal == 0 || goal == self.daily_goal {
            return false;
        }
        self.daily_goal = goal;
        true
    }

    pub fn set_theme(&mut self, theme: Theme) -> bool {
        if self.theme == theme {
            return false;
        }
        self.theme = theme;
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
