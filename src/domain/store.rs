use crate::domain::models::{NewTask, Recurrence, Task, TaskId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    Complete(TaskId),
    Restore(TaskId),
    Delete(TaskId),
    Reschedule {
        id: TaskId,
        date: Option<NaiveDate>,
    },
    RescheduleOverdue {
        today: NaiveDate,
    },
    Retitle {
        id: TaskId,
        title: String,
    },
    SetNotes {
        id: TaskId,
        notes: Option<String>,
    },
    SetRecurring {
        id: TaskId,
        recurring: Option<Recurrence>,
    },
    AccumulateTime {
        id: TaskId,
        seconds: u64,
    },
    ResetTime(TaskId),
    IncrementPomodoro(TaskId),
    Start(TaskId),
    ClearStarted,
    Reorder {
        drag: TaskId,
        target: TaskId,
    },
}

impl TaskAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Complete(_) => "complete",
            Self::Restore(_) => "restore",
            Self::Delete(_) => "delete",
            Self::Reschedule { .. } => "reschedule",
            Self::RescheduleOverdue { .. } => "reschedule_overdue",
            Self::Retitle { .. } => "retitle",
            Self::SetNotes { .. } => "set_notes",
            Self::SetRecurring { .. } => "set_recurring",
            Self::AccumulateTime { .. } => "accumulate_time",
            Self::ResetTime(_) => "reset_time",
            Self::IncrementPomodoro(_) => "increment_pomodoro",
            Self::Start(_) => "start",
            Self::ClearStarted => "clear_started",
            Self::Reorder { .. } => "reorder",
        }
    }
}

/// Ordered task collection. The backing vector is kept sorted by `order`.
///
/// Every operation is total: unknown ids and invalid input leave the store
/// untouched and report `false`/`None` instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskStore {
    tasks: Vec<Task>,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut store = Self::default();
        store.replace_all(tasks);
        store
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.position(id).is_some()
    }

    pub fn has_provisional(&self) -> bool {
        self.tasks.iter().any(|task| task.id.is_provisional())
    }

    pub fn replace_all(&mut self, mut tasks: Vec<Task>) {
        tasks.sort_by_key(|task| task.order);
        self.tasks = tasks;
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn add(&mut self, draft: NewTask, now: DateTime<Utc>) -> Option<Task> {
        let title = draft.title.trim();
        if title.is_empty() {
            return None;
        }
        let id = draft.id.unwrap_or_else(|| TaskId::provisional(now));
        if self.contains(&id) {
            return None;
        }

        let order = self
            .tasks
            .iter()
            .map(|task| task.order)
            .max()
            .map_or(0, |max| max + 1);
        let task = Task {
            id,
            title: title.to_string(),
            completed: false,
            created_at: now,
            scheduled_date: draft.scheduled_date,
            recurring: draft.recurring,
            time_spent: 0,
            started_at: None,
            completed_at: None,
            notes: normalize_notes(draft.notes),
            pomodoro_sessions: 0,
            order,
        };
        self.tasks.push(task.clone());
        Some(task)
    }

    pub fn apply(&mut self, action: TaskAction, now: DateTime<Utc>) -> bool {
        match action {
            TaskAction::Complete(id) => self.complete(&id, now),
            TaskAction::Restore(id) => self.restore(&id),
            TaskAction::Delete(id) => self.delete(&id).is_some(),
            TaskAction::Reschedule { id, date } => self.reschedule(&id, date),
            TaskAction::RescheduleOverdue { today } => self.reschedule_overdue(today) > 0,
            TaskAction::Retitle { id, title } => self.retitle(&id, &title),
            TaskAction::SetNotes { id, notes } => self.set_notes(&id, notes),
            TaskAction::SetRecurring { id, recurring } => self.set_recurring(&id, recurring),
            TaskAction::AccumulateTime { id, seconds } => self.accumulate_time(&id, seconds),
            TaskAction::ResetTime(id) => self.reset_time(&id),
            TaskAction::IncrementPomodoro(id) => self.increment_pomodoro(&id),
            TaskAction::Start(id) => self.start(&id, now),
            TaskAction::ClearStarted => self.clear_started(),
            TaskAction::Reorder { drag, target } => self.reorder(&drag, &target),
        }
    }

    pub fn complete(&mut self, id: &TaskId, now: DateTime<Utc>) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        if task.completed {
            return false;
        }
        task.completed = true;
        task.completed_at = Some(now);
        task.started_at = None;
        true
    }

    pub fn restore(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        if !task.completed {
            return false;
        }
        task.completed = false;
        task.completed_at = None;
        true
    }

    pub fn delete(&mut self, id: &TaskId) -> Option<Task> {
        let index = self.position(id)?;
        Some(self.tasks.remove(index))
    }

    pub fn reschedule(&mut self, id: &TaskId, date: Option<NaiveDate>) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        if task.scheduled_date == date {
            return false;
        }
        task.scheduled_date = date;
        true
    }

    pub fn reschedule_overdue(&mut self, today: NaiveDate) -> usize {
        let mut moved = 0;
        for task in self.tasks.iter_mut().filter(|task| task.is_overdue(today)) {
            task.scheduled_date = Some(today);
            moved += 1;
        }
        moved
    }

    pub fn retitle(&mut self, id: &TaskId, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        if task.title == title {
            return false;
        }
        task.title = title.to_string();
        true
    }

    pub fn set_notes(&mut self, id: &TaskId, notes: Option<String>) -> bool {
        let notes = normalize_notes(notes);
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        if task.notes == notes {
            return false;
        }
        task.notes = notes;
        true
    }

    pub fn set_recurring(&mut self, id: &TaskId, recurring: Option<Recurrence>) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        if task.recurring == recurring {
            return false;
        }
        task.recurring = recurring;
        true
    }

    pub fn accumulate_time(&mut self, id: &TaskId, seconds: u64) -> bool {
        if seconds == 0 {
            return false;
        }
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        task.time_spent = task.time_spent.saturating_add(seconds);
        true
    }

    pub fn reset_time(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        if task.time_spent == 0 {
            return false;
        }
        task.time_spent = 0;
        true
    }

    pub fn increment_pomodoro(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        task.pomodoro_sessions = task.pomodoro_sessions.saturating_add(1);
        true
    }

    pub fn start(&mut self, id: &TaskId, now: DateTime<Utc>) -> bool {
        if !self.get(id).is_some_and(|task| !task.completed) {
            return false;
        }
        for task in &mut self.tasks {
            task.started_at = if &task.id == id { Some(now) } else { None };
        }
        true
    }

    pub fn clear_started(&mut self) -> bool {
        let mut changed = false;
        for task in self.tasks.iter_mut().filter(|task| task.started_at.is_some()) {
            task.started_at = None;
            changed = true;
        }
        changed
    }

    pub fn reorder(&mut self, drag: &TaskId, target: &TaskId) -> bool {
        let (Some(from), Some(to)) = (self.position(drag), self.position(target)) else {
            return false;
        };
        let dragged = self.tasks.remove(from);
        let to = to.min(self.tasks.len());
        self.tasks.insert(to, dragged);
        for (index, task) in self.tasks.iter_mut().enumerate() {
            task.order = index as i64;
        }
        true
    }

    /// Swaps a provisional identity for the durable record's identity.
    ///
    /// Only `id` and `created_at` come from `durable`; every other field keeps
    /// the value it has locally right now, including edits made while the
    /// create call was in flight.
    pub fn reconcile_created(&mut self, provisional: &TaskId, durable: &Task) -> bool {
        if !provisional.is_provisional() || durable.id.is_provisional() {
            return false;
        }
        if self.contains(&durable.id) {
            return false;
        }
        let Some(task) = self.get_mut(provisional) else {
            return false;
        };
        task.id = durable.id.clone();
        task.created_at = durable.created_at;
        true
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }

    fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| &task.id == id)
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn now() -> DateTime<Utc> {
        fixed_time("2026-02-16T09:00:00Z")
    }

    fn seeded(count: usize) -> (TaskStore, Vec<TaskId>) {
        let mut store = TaskStore::default();
        let ids = (0..count)
            .map(|index| {
                store
                    .add(NewTask::titled(format!("task {index}")), now())
                    .expect("add task")
                    .id
            })
            .collect();
        (store, ids)
    }

    fn durable_echo(store: &TaskStore, provisional: &TaskId, id: &str) -> Task {
        let mut echo = store.get(provisional).expect("provisional exists").clone();
        echo.id = TaskId::durable(id);
        echo.created_at = fixed_time("2026-02-16T09:00:02Z");
        echo
    }

    #[test]
    fn add_assigns_defaults_and_next_order() {
        let (mut store, _) = seeded(2);
        let task = store
            .add(
                NewTask {
                    notes: Some("  ".to_string()),
                    ..NewTask::titled("  Buy milk  ")
                },
                now(),
            )
            .expect("add task");

        assert!(task.id.is_provisional());
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.order, 2);
        assert_eq!(task.time_spent, 0);
        assert_eq!(task.pomodoro_sessions, 0);
        assert!(!task.completed);
        assert_eq!(task.notes, None);
        assert_eq!(task.created_at, now());
    }

    #[test]
    fn add_rejects_blank_title_and_duplicate_id() {
        let (mut store, ids) = seeded(1);
        assert!(store.add(NewTask::titled("   "), now()).is_none());
        let duplicate = NewTask {
            id: Some(ids[0].clone()),
            ..NewTask::titled("again")
        };
        assert!(store.add(duplicate, now()).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn complete_and_restore_toggle_timestamps() {
        let (mut store, ids) = seeded(1);
        assert!(store.start(&ids[0], now()));
        assert!(store.complete(&ids[0], now()));
        let task = store.get(&ids[0]).expect("task");
        assert!(task.completed);
        assert_eq!(task.completed_at, Some(now()));
        assert_eq!(task.started_at, None);
        assert!(!store.complete(&ids[0], fixed_time("2026-02-16T10:00:00Z")));
        assert_eq!(store.get(&ids[0]).expect("task").completed_at, Some(now()));

        assert!(store.restore(&ids[0]));
        let task = store.get(&ids[0]).expect("task");
        assert!(!task.completed);
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn operations_on_missing_ids_are_noops() {
        let (mut store, _) = seeded(2);
        let before = store.clone();
        let missing = TaskId::durable("missing");
        assert!(!store.complete(&missing, now()));
        assert!(!store.restore(&missing));
        assert!(store.delete(&missing).is_none());
        assert!(!store.reschedule(&missing, Some(day("2026-02-20"))));
        assert!(!store.retitle(&missing, "x"));
        assert!(!store.accumulate_time(&missing, 5));
        assert!(!store.increment_pomodoro(&missing));
        assert!(!store.start(&missing, now()));
        assert!(!store.reorder(&missing, &missing));
        assert_eq!(store, before);
    }

    #[test]
    fn retitle_rejects_whitespace() {
        let (mut store, ids) = seeded(1);
        assert!(!store.retitle(&ids[0], " \t "));
        assert_eq!(store.get(&ids[0]).expect("task").title, "task 0");
        assert!(store.retitle(&ids[0], "Renamed"));
        assert_eq!(store.get(&ids[0]).expect("task").title, "Renamed");
    }

    #[test]
    fn start_keeps_a_single_started_task() {
        let (mut store, ids) = seeded(3);
        assert!(store.start(&ids[0], now()));
        assert!(store.start(&ids[2], now()));
        let started = store
            .tasks()
            .iter()
            .filter(|task| task.started_at.is_some())
            .map(|task| task.id.clone())
            .collect::<Vec<_>>();
        assert_eq!(started, vec![ids[2].clone()]);
        assert!(store.clear_started());
        assert!(!store.clear_started());
    }

    #[test]
    fn start_ignores_completed_task() {
        let (mut store, ids) = seeded(1);
        store.complete(&ids[0], now());
        assert!(!store.start(&ids[0], now()));
    }

    #[test]
    fn accumulate_and_pomodoro_counters() {
        let (mut store, ids) = seeded(1);
        assert!(!store.accumulate_time(&ids[0], 0));
        assert!(store.accumulate_time(&ids[0], 30));
        assert!(store.accumulate_time(&ids[0], 12));
        assert!(store.increment_pomodoro(&ids[0]));
        let task = store.get(&ids[0]).expect("task");
        assert_eq!(task.time_spent, 42);
        assert_eq!(task.pomodoro_sessions, 1);
        assert!(store.reset_time(&ids[0]));
        assert_eq!(store.get(&ids[0]).expect("task").time_spent, 0);
    }

    #[test]
    fn reorder_moves_before_target_when_dragging_up() {
        let (mut store, ids) = seeded(4);
        assert!(store.reorder(&ids[3], &ids[1]));
        let order = store.tasks().iter().map(|task| task.id.clone()).collect::<Vec<_>>();
        assert_eq!(order, vec![ids[0].clone(), ids[3].clone(), ids[1].clone(), ids[2].clone()]);
    }

    #[test]
    fn reorder_takes_target_slot_when_dragging_down() {
        let (mut store, ids) = seeded(4);
        assert!(store.reorder(&ids[0], &ids[2]));
        let order = store.tasks().iter().map(|task| task.id.clone()).collect::<Vec<_>>();
        assert_eq!(order, vec![ids[1].clone(), ids[2].clone(), ids[0].clone(), ids[3].clone()]);
    }

    #[test]
    fn replace_all_sorts_by_order() {
        let (store, ids) = seeded(3);
        let mut shuffled = store.tasks().to_vec();
        shuffled.reverse();
        let restored = TaskStore::new(shuffled);
        let order = restored.tasks().iter().map(|task| task.id.clone()).collect::<Vec<_>>();
        assert_eq!(order, ids);
    }

    #[test]
    fn reschedule_overdue_moves_only_incomplete_past_tasks() {
        let (mut store, ids) = seeded(3);
        let today = day("2026-02-16");
        store.reschedule(&ids[0], Some(day("2026-02-10")));
        store.reschedule(&ids[1], Some(day("2026-02-11")));
        store.complete(&ids[1], now());
        store.reschedule(&ids[2], Some(day("2026-02-20")));

        assert_eq!(store.reschedule_overdue(today), 1);
        assert_eq!(store.get(&ids[0]).expect("task").scheduled_date, Some(today));
        assert_eq!(
            store.get(&ids[1]).expect("task").scheduled_date,
            Some(day("2026-02-11"))
        );
        assert_eq!(
            store.get(&ids[2]).expect("task").scheduled_date,
            Some(day("2026-02-20"))
        );
    }

    #[test]
    fn reconcile_preserves_edits_made_while_create_was_in_flight() {
        let (mut store, ids) = seeded(2);
        let provisional = ids[1].clone();
        let echo = durable_echo(&store, &provisional, "0d9c3c4e-6a55-4bde-8d43-0c6a4c1b8e7f");

        store.retitle(&provisional, "X");
        store.reschedule(&provisional, Some(day("2026-02-18")));
        store.accumulate_time(&provisional, 25);
        store.reorder(&provisional, &ids[0]);
        store.complete(&provisional, now());

        assert!(store.reconcile_created(&provisional, &echo));
        let task = store.get(&echo.id).expect("durable task");
        assert_eq!(task.title, "X");
        assert_eq!(task.scheduled_date, Some(day("2026-02-18")));
        assert_eq!(task.time_spent, 25);
        assert_eq!(task.order, 0);
        assert!(task.completed);
        assert_eq!(task.created_at, echo.created_at);
        assert!(store.get(&provisional).is_none());
        let still_provisional = store
            .tasks()
            .iter()
            .filter(|task| task.id.is_provisional())
            .map(|task| task.id.clone())
            .collect::<Vec<_>>();
        assert_eq!(still_provisional, vec![ids[0].clone()]);
    }

    #[test]
    fn reconcile_is_a_noop_for_missing_or_durable_input() {
        let (mut store, ids) = seeded(1);
        let echo = durable_echo(&store, &ids[0], "durable-1");
        assert!(!store.reconcile_created(&TaskId::Provisional("gone".to_string()), &echo));
        assert!(!store.reconcile_created(&echo.id, &echo));
        let mut provisional_echo = echo.clone();
        provisional_echo.id = TaskId::Provisional("still-temp".to_string());
        assert!(!store.reconcile_created(&ids[0], &provisional_echo));

        assert!(store.reconcile_created(&ids[0], &echo));
        assert!(!store.reconcile_created(&ids[0], &echo));
    }

    #[test]
    fn apply_dispatches_actions() {
        let (mut store, ids) = seeded(2);
        assert!(store.apply(
            TaskAction::AccumulateTime {
                id: ids[0].clone(),
                seconds: 9
            },
            now()
        ));
        assert!(store.apply(TaskAction::Delete(ids[1].clone()), now()));
        assert!(!store.apply(TaskAction::Delete(ids[1].clone()), now()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&ids[0]).expect("task").time_spent, 9);
        assert_eq!(TaskAction::ClearStarted.name(), "clear_started");
    }

    // Order renumbering: every reorder leaves `order` equal to the position.
    proptest! {
        #[test]
        fn reorder_always_renumbers_contiguously(
            count in 1usize..12,
            moves in prop::collection::vec((0usize..16, 0usize..16), 1..24)
        ) {
            let (mut store, ids) = seeded(count);
            for (drag, target) in moves {
                let drag = ids.get(drag).cloned().unwrap_or_else(|| TaskId::durable("absent"));
                let target = ids.get(target).cloned().unwrap_or_else(|| TaskId::durable("absent"));
                store.reorder(&drag, &target);
                for (index, task) in store.tasks().iter().enumerate() {
                    prop_assert_eq!(task.order, index as i64);
                }
            }
            prop_assert_eq!(store.len(), count);
        }
    }

    proptest! {
        #[test]
        fn reconcile_keeps_concurrent_title_and_date(
            title in "[A-Za-z][A-Za-z0-9 ]{0,24}",
            offset in -30i64..30i64
        ) {
            let (mut store, ids) = seeded(1);
            let provisional = ids[0].clone();
            let echo = durable_echo(&store, &provisional, "durable-xyz");
            let date = day("2026-02-16") + chrono::Duration::days(offset);

            store.retitle(&provisional, &title);
            store.reschedule(&provisional, Some(date));
            prop_assert!(store.reconcile_created(&provisional, &echo));

            let task = store.get(&TaskId::durable("durable-xyz")).expect("durable task");
            prop_assert_eq!(task.title.as_str(), title.trim());
            prop_assert_eq!(task.scheduled_date, Some(date));
        }
    }
}
