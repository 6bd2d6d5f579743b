use crate::domain::models::{Settings, Task, TaskId};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskView {
    #[default]
    Today,
    Overdue,
    All,
    Completed,
}

impl TaskView {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "today" => Some(Self::Today),
            "overdue" => Some(Self::Overdue),
            "all" => Some(Self::All),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }
}

pub fn overdue(tasks: &[Task], today: NaiveDate) -> Vec<&Task> {
    by_order(tasks.iter().filter(|task| task.is_overdue(today)).collect())
}

pub fn today_or_unscheduled(tasks: &[Task], today: NaiveDate) -> Vec<&Task> {
    by_order(
        tasks
            .iter()
            .filter(|task| !task.completed)
            .filter(|task| task.scheduled_date.is_none_or(|date| date == today))
            .collect(),
    )
}

pub fn all_incomplete(tasks: &[Task]) -> Vec<&Task> {
    by_order(tasks.iter().filter(|task| !task.completed).collect())
}

pub fn completed(tasks: &[Task]) -> Vec<&Task> {
    let mut done = tasks.iter().filter(|task| task.completed).collect::<Vec<_>>();
    done.sort_by(|left, right| right.completed_at.cmp(&left.completed_at));
    done
}

pub fn view(tasks: &[Task], view: TaskView, today: NaiveDate) -> Vec<&Task> {
    match view {
        TaskView::Today => today_or_unscheduled(tasks, today),
        TaskView::Overdue => overdue(tasks, today),
        TaskView::All => all_incomplete(tasks),
        TaskView::Completed => completed(tasks),
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CurrentAndNext<'a> {
    pub current: Option<&'a Task>,
    pub next: Option<&'a Task>,
}

pub fn current_and_next<'a>(
    filtered: &[&'a Task],
    current_id: Option<&TaskId>,
) -> CurrentAndNext<'a> {
    let index = current_id
        .and_then(|id| filtered.iter().position(|task| &task.id == id))
        .or_else(|| filtered.iter().position(|task| !task.completed));
    CurrentAndNext {
        current: index.map(|index| filtered[index]),
        next: index.and_then(|index| filtered.get(index + 1)).copied(),
    }
}

/// Picks the successor of `removed` after it left the filtered set.
///
/// Walks forward from the removed task's former slot in `before` and wraps
/// to the first remaining task when it was last.
pub fn advance_after_removal(
    before: &[TaskId],
    removed: &TaskId,
    remaining: &[TaskId],
) -> Option<TaskId> {
    let remaining = remaining
        .iter()
        .filter(|id| *id != removed)
        .collect::<Vec<_>>();
    let forward = before
        .iter()
        .position(|id| id == removed)
        .and_then(|index| {
            before[index + 1..]
                .iter()
                .find(|candidate| remaining.contains(candidate))
        });
    forward.or_else(|| remaining.first().copied()).cloned()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DateGroup<'a> {
    pub date: Option<NaiveDate>,
    pub tasks: Vec<&'a Task>,
}

pub fn group_by_date<'a>(tasks: &[&'a Task]) -> Vec<DateGroup<'a>> {
    let mut dated: BTreeMap<NaiveDate, Vec<&'a Task>> = BTreeMap::new();
    let mut unscheduled = Vec::new();
    for task in tasks {
        match task.scheduled_date {
            Some(date) => dated.entry(date).or_default().push(*task),
            None => unscheduled.push(*task),
        }
    }

    let mut groups = dated
        .into_iter()
        .map(|(date, tasks)| DateGroup {
            date: Some(date),
            tasks: by_order(tasks),
        })
        .collect::<Vec<_>>();
    if !unscheduled.is_empty() {
        groups.push(DateGroup {
            date: None,
            tasks: by_order(unscheduled),
        });
    }
    groups
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayColumn<'a> {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub tasks: Vec<&'a Task>,
}

pub fn week_view<'a>(tasks: &[&'a Task], today: NaiveDate) -> Vec<DayColumn<'a>> {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    (0..7)
        .map(|offset| {
            let date = monday + Duration::days(offset);
            DayColumn {
                date,
                weekday: date.weekday(),
                tasks: by_order(
                    tasks
                        .iter()
                        .copied()
                        .filter(|task| task.is_scheduled_for(date))
                        .collect(),
                ),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub completed_count: u32,
    pub focus_seconds: u64,
    pub pomodoro_sessions: u32,
    pub daily_goal: u32,
    pub goal_reached: bool,
}

pub fn daily_summary<F>(tasks: &[Task], day: NaiveDate, settings: &Settings, local_date: F) -> DailySummary
where
    F: Fn(DateTime<Utc>) -> NaiveDate,
{
    let done_today = tasks
        .iter()
        .filter(|task| task.completed_at.is_some_and(|at| local_date(at) == day))
        .collect::<Vec<_>>();
    let completed_count = u32::try_from(done_today.len()).unwrap_or(u32::MAX);

    DailySummary {
        date: day,
        completed_count,
        focus_seconds: done_today.iter().map(|task| task.time_spent).sum(),
        pomodoro_sessions: done_today.iter().map(|task| task.pomodoro_sessions).sum(),
        daily_goal: settings.daily_goal,
        goal_reached: completed_count >= settings.daily_goal,
    }
}

fn by_order(mut tasks: Vec<&Task>) -> Vec<&Task> {
    tasks.sort_by_key(|task| task.order);
    tasks
}
