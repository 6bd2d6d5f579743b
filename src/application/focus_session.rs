use crate::application::ticker::TickerHandle;
use crate::domain::models::TaskId;
use crate::domain::partition::advance_after_removal;
use crate::domain::store::TaskStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_WORK_SECONDS: u32 = 25 * 60;
pub const DEFAULT_BREAK_SECONDS: u32 = 5 * 60;
pub const DEFAULT_FLUSH_THRESHOLD_SECONDS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub work_seconds: u32,
    pub break_seconds: u32,
    pub flush_threshold_seconds: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            work_seconds: DEFAULT_WORK_SECONDS,
            break_seconds: DEFAULT_BREAK_SECONDS,
            flush_threshold_seconds: DEFAULT_FLUSH_THRESHOLD_SECONDS,
        }
    }
}

impl TimerConfig {
    pub fn normalized(self) -> Self {
        Self {
            work_seconds: self.work_seconds.max(1),
            break_seconds: self.break_seconds.max(1),
            flush_threshold_seconds: self.flush_threshold_seconds.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    #[default]
    Stopwatch,
    Pomodoro,
}

impl TimerMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stopwatch" => Some(Self::Stopwatch),
            "pomodoro" => Some(Self::Pomodoro),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FocusState {
    Idle,
    Running { mode: TimerMode },
    Paused { mode: TimerMode },
    Break,
    AwaitingResume,
    NextTaskPrompt { next: TaskId },
    Resting { next: TaskId },
}

impl FocusState {
    pub fn is_ticking(&self) -> bool {
        matches!(self, Self::Running { .. } | Self::Break)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::Paused { .. } => "paused",
            Self::Break => "break",
            Self::AwaitingResume => "awaiting_resume",
            Self::NextTaskPrompt { .. } => "next_task_prompt",
            Self::Resting { .. } => "resting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FocusEvent {
    Started { task_id: TaskId, mode: TimerMode },
    Paused { task_id: TaskId },
    Resumed { task_id: TaskId },
    Flushed { task_id: TaskId, seconds: u64 },
    PomodoroCompleted { task_id: TaskId, sessions: u32 },
    BreakStarted { seconds: u32 },
    BreakFinished { auto_resumed: bool },
    TaskCompleted { task_id: TaskId, next: Option<TaskId> },
    Stopped { task_id: TaskId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockDisplay {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl ClockDisplay {
    pub fn from_seconds(total: u64) -> Self {
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for ClockDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hours > 0 {
            write!(f, "{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
        } else {
            write!(f, "{:02}:{:02}", self.minutes, self.seconds)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSnapshot {
    pub state: FocusState,
    pub mode: TimerMode,
    pub task_id: Option<TaskId>,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u32,
    pub unflushed_seconds: u64,
    pub display: String,
    pub minimized: bool,
}

/// Timer state machine for the task being focused on.
///
/// The controller owns only transient counters. Every second it counts is
/// eventually written to the store through `accumulate_time`, either when the
/// unflushed counter reaches the configured threshold or on any transition out
/// of a running interval.
#[derive(Debug)]
pub struct FocusController {
    config: TimerConfig,
    mode: TimerMode,
    state: FocusState,
    task_id: Option<TaskId>,
    elapsed_seconds: u64,
    remaining_seconds: u32,
    unflushed_seconds: u64,
    minimized: bool,
    ticker: Option<TickerHandle>,
}

impl Default for FocusController {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl FocusController {
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config: config.normalized(),
            mode: TimerMode::default(),
            state: FocusState::Idle,
            task_id: None,
            elapsed_seconds: 0,
            remaining_seconds: 0,
            unflushed_seconds: 0,
            minimized: false,
            ticker: None,
        }
    }

    pub fn config(&self) -> TimerConfig {
        self.config
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }

    pub fn unflushed_seconds(&self) -> u64 {
        self.unflushed_seconds
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn set_mode(&mut self, mode: TimerMode) -> bool {
        if self.mode == mode
            || matches!(
                self.state,
                FocusState::Running { .. } | FocusState::Paused { .. } | FocusState::Break
            )
        {
            return false;
        }
        self.mode = mode;
        true
    }

    pub fn needs_ticker(&self) -> bool {
        self.state.is_ticking() && self.ticker.is_none()
    }

    pub fn attach_ticker(&mut self, handle: TickerHandle) {
        self.cancel_ticker();
        self.ticker = Some(handle);
    }

    pub fn accepts_tick(&self, generation: u64) -> bool {
        self.state.is_ticking()
            && self
                .ticker
                .as_ref()
                .is_some_and(|ticker| ticker.generation() == generation)
    }

    pub fn start(&mut self, store: &mut TaskStore, task_id: &TaskId, now: DateTime<Utc>) -> Vec<FocusEvent> {
        if !store.get(task_id).is_some_and(|task| !task.completed) {
            return Vec::new();
        }
        if self.task_id.as_ref() == Some(task_id) && matches!(self.state, FocusState::Running { .. }) {
            return Vec::new();
        }

        let mut events = Vec::new();
        events.extend(self.flush(store));
        self.cancel_ticker();

        store.start(task_id, now);
        let time_spent = store.get(task_id).map_or(0, |task| task.time_spent);
        self.task_id = Some(task_id.clone());
        self.state = FocusState::Running { mode: self.mode };
        match self.mode {
            TimerMode::Stopwatch => {
                self.elapsed_seconds = time_spent;
                self.remaining_seconds = 0;
            }
            TimerMode::Pomodoro => {
                self.elapsed_seconds = 0;
                self.remaining_seconds = self.config.work_seconds;
            }
        }
        events.push(FocusEvent::Started {
            task_id: task_id.clone(),
            mode: self.mode,
        });
        events
    }

    pub fn tick(&mut self, store: &mut TaskStore) -> Vec<FocusEvent> {
        self.advance(store, 1)
    }

    pub fn advance(&mut self, store: &mut TaskStore, seconds: u64) -> Vec<FocusEvent> {
        let mut events = Vec::new();
        for _ in 0..seconds {
            if !self.state.is_ticking() {
                break;
            }
            events.extend(self.step(store));
        }
        events
    }

    fn step(&mut self, store: &mut TaskStore) -> Vec<FocusEvent> {
        let mut events = Vec::new();
        match self.state {
            FocusState::Running { mode } => {
                self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
                self.unflushed_seconds += 1;
                if mode == TimerMode::Pomodoro {
                    self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
                }
                if self.unflushed_seconds >= u64::from(self.config.flush_threshold_seconds) {
                    events.extend(self.flush(store));
                }
                if mode == TimerMode::Pomodoro && self.remaining_seconds == 0 {
                    events.extend(self.finish_work_interval(store));
                }
            }
            FocusState::Break => {
                self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
                if self.remaining_seconds == 0 {
                    events.push(self.finish_break());
                }
            }
            _ => {}
        }
        events
    }

    fn finish_work_interval(&mut self, store: &mut TaskStore) -> Vec<FocusEvent> {
        let mut events = Vec::new();
        self.cancel_ticker();
        events.extend(self.flush(store));
        if let Some(task_id) = self.task_id.clone() {
            store.increment_pomodoro(&task_id);
            let sessions = store.get(&task_id).map_or(0, |task| task.pomodoro_sessions);
            events.push(FocusEvent::PomodoroCompleted { task_id, sessions });
        }
        self.state = FocusState::Break;
        self.remaining_seconds = self.config.break_seconds;
        events.push(FocusEvent::BreakStarted {
            seconds: self.config.break_seconds,
        });
        events
    }

    fn finish_break(&mut self) -> FocusEvent {
        self.cancel_ticker();
        self.elapsed_seconds = 0;
        self.remaining_seconds = self.config.work_seconds;
        self.state = if self.minimized {
            FocusState::Running {
                mode: TimerMode::Pomodoro,
            }
        } else {
            FocusState::AwaitingResume
        };
        FocusEvent::BreakFinished {
            auto_resumed: self.minimized,
        }
    }

    pub fn pause(&mut self, store: &mut TaskStore) -> Vec<FocusEvent> {
        let FocusState::Running { mode } = self.state else {
            return Vec::new();
        };
        let Some(task_id) = self.task_id.clone() else {
            return Vec::new();
        };
        let mut events = Vec::new();
        events.extend(self.flush(store));
        self.cancel_ticker();
        self.state = FocusState::Paused { mode };
        events.push(FocusEvent::Paused { task_id });
        events
    }

    pub fn resume(&mut self) -> Vec<FocusEvent> {
        let mode = match self.state {
            FocusState::Paused { mode } => mode,
            FocusState::AwaitingResume => TimerMode::Pomodoro,
            _ => return Vec::new(),
        };
        let Some(task_id) = self.task_id.clone() else {
            return Vec::new();
        };
        self.state = FocusState::Running { mode };
        vec![FocusEvent::Resumed { task_id }]
    }

    pub fn skip_break(&mut self) -> Vec<FocusEvent> {
        if self.state != FocusState::Break {
            return Vec::new();
        }
        vec![self.finish_break()]
    }

    pub fn stop(&mut self, store: &mut TaskStore) -> Vec<FocusEvent> {
        let mut events = Vec::new();
        events.extend(self.flush(store));
        self.cancel_ticker();
        let task_id = self.task_id.take();
        let was_timing = matches!(
            self.state,
            FocusState::Running { .. } | FocusState::Paused { .. } | FocusState::Break | FocusState::AwaitingResume
        );
        if was_timing {
            store.clear_started();
        }
        self.clear_counters();
        self.state = FocusState::Idle;
        if let (true, Some(task_id)) = (was_timing, task_id) {
            events.push(FocusEvent::Stopped { task_id });
        }
        events
    }

    pub fn complete(&mut self, store: &mut TaskStore, filtered: &[TaskId], now: DateTime<Utc>) -> Vec<FocusEvent> {
        let Some(task_id) = self.task_id.clone() else {
            return Vec::new();
        };
        let mut events = Vec::new();
        events.extend(self.flush(store));
        self.cancel_ticker();
        self.task_id = None;
        self.clear_counters();

        if !store.complete(&task_id, now) {
            self.state = FocusState::Idle;
            return events;
        }

        let remaining: Vec<TaskId> = filtered
            .iter()
            .filter(|id| store.get(id).is_some_and(|task| !task.completed))
            .cloned()
            .collect();
        let next = advance_after_removal(filtered, &task_id, &remaining);
        self.state = match &next {
            Some(next) => FocusState::NextTaskPrompt { next: next.clone() },
            None => FocusState::Idle,
        };
        events.push(FocusEvent::TaskCompleted { task_id, next });
        events
    }

    pub fn rest(&mut self) -> bool {
        let FocusState::NextTaskPrompt { next } = &self.state else {
            return false;
        };
        self.state = FocusState::Resting { next: next.clone() };
        true
    }

    pub fn back_to_work(&mut self) -> Option<TaskId> {
        match std::mem::replace(&mut self.state, FocusState::Idle) {
            FocusState::NextTaskPrompt { next } | FocusState::Resting { next } => Some(next),
            other => {
                self.state = other;
                None
            }
        }
    }

    pub fn set_minimized(&mut self, minimized: bool) -> bool {
        if self.minimized == minimized {
            return false;
        }
        self.minimized = minimized;
        true
    }

    pub fn retarget(&mut self, old: &TaskId, new: &TaskId) -> bool {
        let mut changed = false;
        if self.task_id.as_ref() == Some(old) {
            self.task_id = Some(new.clone());
            changed = true;
        }
        match &mut self.state {
            FocusState::NextTaskPrompt { next } | FocusState::Resting { next } if next == old => {
                *next = new.clone();
                changed = true;
            }
            _ => {}
        }
        changed
    }

    /// Call before the task leaves the store so pending seconds still land.
    pub fn task_removed(&mut self, store: &mut TaskStore, id: &TaskId) -> Vec<FocusEvent> {
        if self.task_id.as_ref() == Some(id) {
            return self.stop(store);
        }
        if matches!(
            &self.state,
            FocusState::NextTaskPrompt { next } | FocusState::Resting { next } if next == id
        ) {
            self.state = FocusState::Idle;
        }
        Vec::new()
    }

    pub fn reset(&mut self) {
        self.cancel_ticker();
        self.task_id = None;
        self.clear_counters();
        self.minimized = false;
        self.state = FocusState::Idle;
    }

    pub fn snapshot(&self) -> FocusSnapshot {
        let shown = match self.state {
            FocusState::Running {
                mode: TimerMode::Stopwatch,
            }
            | FocusState::Paused {
                mode: TimerMode::Stopwatch,
            } => self.elapsed_seconds,
            _ => u64::from(self.remaining_seconds),
        };
        FocusSnapshot {
            state: self.state.clone(),
            mode: self.mode,
            task_id: self.task_id.clone(),
            elapsed_seconds: self.elapsed_seconds,
            remaining_seconds: self.remaining_seconds,
            unflushed_seconds: self.unflushed_seconds,
            display: ClockDisplay::from_seconds(shown).to_string(),
            minimized: self.minimized,
        }
    }

    fn flush(&mut self, store: &mut TaskStore) -> Option<FocusEvent> {
        let seconds = std::mem::take(&mut self.unflushed_seconds);
        if seconds == 0 {
            return None;
        }
        let task_id = self.task_id.clone()?;
        if !store.accumulate_time(&task_id, seconds) {
            return None;
        }
        Some(FocusEvent::Flushed { task_id, seconds })
    }

    fn clear_counters(&mut self) {
        self.elapsed_seconds = 0;
        self.remaining_seconds = 0;
        self.unflushed_seconds = 0;
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NewTask;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn now() -> DateTime<Utc> {
        fixed_time("2026-02-16T09:00:00Z")
    }

    fn store_with(titles: &[&str]) -> (TaskStore, Vec<TaskId>) {
        let mut store = TaskStore::default();
        let ids = titles
            .iter()
            .enumerate()
            .map(|(index, title)| {
                let draft = NewTask {
                    id: Some(TaskId::durable(format!("task-{index}"))),
                    ..NewTask::titled(*title)
                };
                store.add(draft, now()).expect("add task").id
            })
            .collect();
        (store, ids)
    }

    fn flushed_total(events: &[FocusEvent]) -> u64 {
        events
            .iter()
            .map(|event| match event {
                FocusEvent::Flushed { seconds, .. } => *seconds,
                _ => 0,
            })
            .sum()
    }

    fn pomodoro_controller(config: TimerConfig) -> FocusController {
        let mut controller = FocusController::new(config);
        assert!(controller.set_mode(TimerMode::Pomodoro));
        controller
    }

    #[test]
    fn pomodoro_work_interval_rolls_into_break() {
        let (mut store, ids) = store_with(&["Deep work"]);
        let mut controller = pomodoro_controller(TimerConfig::default());

        let mut events = controller.start(&mut store, &ids[0], now());
        events.extend(controller.advance(&mut store, 1500));

        assert_eq!(controller.state(), &FocusState::Break);
        assert_eq!(controller.snapshot().remaining_seconds, DEFAULT_BREAK_SECONDS);
        let task = store.get(&ids[0]).expect("task");
        assert_eq!(task.pomodoro_sessions, 1);
        assert_eq!(task.time_spent, 1500);
        assert_eq!(flushed_total(&events), 1500);
        assert!(events.contains(&FocusEvent::PomodoroCompleted {
            task_id: ids[0].clone(),
            sessions: 1
        }));
    }

    #[test]
    fn break_expiry_waits_for_resume_in_normal_layout() {
        let (mut store, ids) = store_with(&["Deep work"]);
        let config = TimerConfig {
            work_seconds: 3,
            break_seconds: 2,
            flush_threshold_seconds: 10,
        };
        let mut controller = pomodoro_controller(config);
        controller.start(&mut store, &ids[0], now());
        controller.advance(&mut store, 5);

        assert_eq!(controller.state(), &FocusState::AwaitingResume);
        assert_eq!(controller.snapshot().remaining_seconds, 3);
        assert!(controller.tick(&mut store).is_empty());

        assert_eq!(
            controller.resume(),
            vec![FocusEvent::Resumed {
                task_id: ids[0].clone()
            }]
        );
        assert_eq!(
            controller.state(),
            &FocusState::Running {
                mode: TimerMode::Pomodoro
            }
        );
    }

    #[test]
    fn break_expiry_auto_resumes_when_minimized() {
        let (mut store, ids) = store_with(&["Deep work"]);
        let config = TimerConfig {
            work_seconds: 3,
            break_seconds: 2,
            flush_threshold_seconds: 1,
        };
        let mut controller = pomodoro_controller(config);
        controller.set_minimized(true);
        controller.start(&mut store, &ids[0], now());
        let events = controller.advance(&mut store, 7);

        assert!(events.contains(&FocusEvent::BreakFinished { auto_resumed: true }));
        assert_eq!(
            controller.state(),
            &FocusState::Running {
                mode: TimerMode::Pomodoro
            }
        );
        assert_eq!(controller.snapshot().remaining_seconds, 1);
        assert_eq!(store.get(&ids[0]).expect("task").time_spent, 5);
    }

    #[test]
    fn stop_flushes_and_keeps_recorded_time() {
        let (mut store, ids) = store_with(&["Read"]);
        store.accumulate_time(&ids[0], 60);
        let mut controller = FocusController::default();

        controller.start(&mut store, &ids[0], now());
        assert_eq!(controller.snapshot().elapsed_seconds, 60);
        controller.advance(&mut store, 7);
        assert_eq!(controller.unflushed_seconds(), 7);

        let events = controller.stop(&mut store);
        let task = store.get(&ids[0]).expect("task");
        assert_eq!(task.time_spent, 67);
        assert!(task.started_at.is_none());
        assert!(events.contains(&FocusEvent::Stopped {
            task_id: ids[0].clone()
        }));
        assert_eq!(controller.state(), &FocusState::Idle);
        assert_eq!(controller.unflushed_seconds(), 0);
    }

    #[test]
    fn switching_tasks_flushes_the_previous_one() {
        let (mut store, ids) = store_with(&["First", "Second"]);
        let mut controller = FocusController::default();

        controller.start(&mut store, &ids[0], now());
        controller.advance(&mut store, 4);
        let events = controller.start(&mut store, &ids[1], now());

        assert_eq!(store.get(&ids[0]).expect("first").time_spent, 4);
        assert!(store.get(&ids[0]).expect("first").started_at.is_none());
        assert!(store.get(&ids[1]).expect("second").started_at.is_some());
        assert_eq!(
            events.first(),
            Some(&FocusEvent::Flushed {
                task_id: ids[0].clone(),
                seconds: 4
            })
        );
    }

    #[test]
    fn pause_flushes_and_halts_ticking() {
        let (mut store, ids) = store_with(&["Write"]);
        let mut controller = FocusController::default();
        controller.start(&mut store, &ids[0], now());
        controller.advance(&mut store, 3);

        controller.pause(&mut store);
        assert_eq!(store.get(&ids[0]).expect("task").time_spent, 3);
        assert!(controller.advance(&mut store, 10).is_empty());
        assert_eq!(controller.snapshot().elapsed_seconds, 3);

        controller.resume();
        controller.advance(&mut store, 2);
        assert_eq!(controller.snapshot().display, "00:05");
    }

    #[test]
    fn completion_offers_the_next_task_once() {
        let (mut store, ids) = store_with(&["A", "B", "C"]);
        let mut controller = FocusController::default();
        controller.start(&mut store, &ids[1], now());
        controller.advance(&mut store, 2);

        let events = controller.complete(&mut store, &ids, now());
        let celebrations = events
            .iter()
            .filter(|event| matches!(event, FocusEvent::TaskCompleted { .. }))
            .count();
        assert_eq!(celebrations, 1);
        assert_eq!(
            controller.state(),
            &FocusState::NextTaskPrompt {
                next: ids[2].clone()
            }
        );
        let task = store.get(&ids[1]).expect("task");
        assert!(task.completed);
        assert_eq!(task.time_spent, 2);

        assert!(controller.complete(&mut store, &ids, now()).is_empty());
        assert!(controller.rest());
        assert_eq!(controller.back_to_work(), Some(ids[2].clone()));
        assert_eq!(controller.state(), &FocusState::Idle);
    }

    #[test]
    fn completing_last_remaining_task_returns_to_idle() {
        let (mut store, ids) = store_with(&["Only"]);
        let mut controller = FocusController::default();
        controller.start(&mut store, &ids[0], now());

        let events = controller.complete(&mut store, &ids, now());
        assert_eq!(
            events,
            vec![FocusEvent::TaskCompleted {
                task_id: ids[0].clone(),
                next: None
            }]
        );
        assert_eq!(controller.state(), &FocusState::Idle);
    }

    #[test]
    fn retarget_follows_reconciled_id() {
        let (mut store, _) = store_with(&[]);
        let provisional = TaskId::provisional(now());
        let draft = NewTask {
            id: Some(provisional.clone()),
            ..NewTask::titled("Draft")
        };
        store.add(draft, now()).expect("add");
        let mut controller = FocusController::default();
        controller.start(&mut store, &provisional, now());
        controller.advance(&mut store, 2);

        let mut durable = store.get(&provisional).expect("task").clone();
        durable.id = TaskId::durable("server-1");
        assert!(store.reconcile_created(&provisional, &durable));
        assert!(controller.retarget(&provisional, &durable.id));

        controller.stop(&mut store);
        assert_eq!(store.get(&durable.id).expect("task").time_spent, 2);
    }

    #[test]
    fn starting_a_completed_task_is_ignored() {
        let (mut store, ids) = store_with(&["Done"]);
        store.complete(&ids[0], now());
        let mut controller = FocusController::default();
        assert!(controller.start(&mut store, &ids[0], now()).is_empty());
        assert_eq!(controller.state(), &FocusState::Idle);
    }

    #[test]
    fn clock_display_truncates() {
        assert_eq!(ClockDisplay::from_seconds(59).to_string(), "00:59");
        assert_eq!(ClockDisplay::from_seconds(3_725).to_string(), "1:02:05");
        assert_eq!(
            ClockDisplay::from_seconds(3_725),
            ClockDisplay {
                hours: 1,
                minutes: 2,
                seconds: 5
            }
        );
    }

    #[test]
    fn mode_is_locked_while_timing() {
        let (mut store, ids) = store_with(&["Task"]);
        let mut controller = FocusController::default();
        controller.start(&mut store, &ids[0], now());
        assert!(!controller.set_mode(TimerMode::Pomodoro));
        controller.stop(&mut store);
        assert!(controller.set_mode(TimerMode::Pomodoro));
    }

    proptest! {
        #[test]
        fn stopwatch_flushes_every_tick_exactly_once(ticks in 0u64..400, threshold in 1u32..60) {
            let (mut store, ids) = store_with(&["Task"]);
            let config = TimerConfig { flush_threshold_seconds: threshold, ..TimerConfig::default() };
            let mut controller = FocusController::new(config);

            let mut events = controller.start(&mut store, &ids[0], now());
            events.extend(controller.advance(&mut store, ticks));
            prop_assert!(controller.unflushed_seconds() < u64::from(threshold));
            events.extend(controller.stop(&mut store));

            prop_assert_eq!(store.get(&ids[0]).expect("task").time_spent, ticks);
            prop_assert_eq!(flushed_total(&events), ticks);
        }

        #[test]
        fn pomodoro_flushes_whole_work_interval(threshold in 1u32..120) {
            let (mut store, ids) = store_with(&["Task"]);
            let config = TimerConfig { flush_threshold_seconds: threshold, ..TimerConfig::default() };
            let mut controller = pomodoro_controller(config);

            let mut events = controller.start(&mut store, &ids[0], now());
            events.extend(controller.advance(&mut store, u64::from(DEFAULT_WORK_SECONDS)));

            prop_assert_eq!(flushed_total(&events), u64::from(DEFAULT_WORK_SECONDS));
            prop_assert_eq!(store.get(&ids[0]).expect("task").pomodoro_sessions, 1);
            prop_assert_eq!(controller.state(), &FocusState::Break);
        }
    }
}
