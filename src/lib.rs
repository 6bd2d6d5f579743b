pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::{
    AppState, AuthStatusResponse, Collaborators, CompletionResponse, DateGroupResponse,
    DayColumnResponse, LoadResponse, TaskListResponse,
};
pub use application::focus_session::{FocusSnapshot, FocusState, TimerConfig, TimerMode};
pub use domain::models::{Recurrence, Session, Settings, Task, TaskId, Theme};
pub use domain::partition::{DailySummary, TaskView};
pub use infrastructure::error::InfraError;
