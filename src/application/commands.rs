use crate::application::auth::AuthManager;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::focus_session::{FocusController, FocusEvent, FocusSnapshot, FocusState, TimerConfig, TimerMode};
use crate::application::selection::{complete_selected, Selection};
use crate::application::sync::{LoadSource, SyncOutcome, SyncReconciler};
use crate::application::ticker::{spawn_ticker, TickControl, TICK_PERIOD};
use crate::domain::clock::{LocalClock, NowProvider};
use crate::domain::models::{NewTask, Recurrence, Session, Settings, Task, TaskId, Theme};
use crate::domain::partition::{
    self, advance_after_removal, current_and_next, DailySummary, DateGroup, DayColumn, TaskView,
};
use crate::domain::store::{TaskAction, TaskStore};
use crate::infrastructure::auth_client::{AuthHttpClient, SupabaseAuthClient};
use crate::infrastructure::config::{read_remote_config, read_timer_settings, read_timezone};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_cache::{FallbackCache, SqliteFallbackCache};
use crate::infrastructure::remote_client::{RemoteTaskStore, SupabaseRestClient, UnconfiguredRemote};
use crate::infrastructure::session_store::{KeyringSessionStore, SessionStore};
use crate::infrastructure::window::{FocusPresentation, HeadlessWindow, WindowControl};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Collaborators {
    pub remote: Arc<dyn RemoteTaskStore>,
    pub auth_client: Arc<dyn AuthHttpClient>,
    pub session_store: Arc<dyn SessionStore>,
    pub cache: Arc<dyn FallbackCache>,
    pub window: Arc<dyn WindowControl>,
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    clock: LocalClock,
    timer_config: TimerConfig,
    tick_period: Duration,
    now_provider: NowProvider,
    auth: AuthManager<dyn SessionStore, dyn AuthHttpClient>,
    sync: SyncReconciler<dyn RemoteTaskStore, dyn FallbackCache>,
    window: Arc<dyn WindowControl>,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let mut offline_reason = None;
        let (remote, auth_client): (Arc<dyn RemoteTaskStore>, Arc<dyn AuthHttpClient>) =
            match read_remote_config(&bootstrap.config_dir) {
                Ok(config) => {
                    let remote: Arc<dyn RemoteTaskStore> =
                        Arc::new(SupabaseRestClient::new(config.url.clone(), config.anon_key.clone()));
                    let auth_client: Arc<dyn AuthHttpClient> =
                        Arc::new(SupabaseAuthClient::new(config.url, config.anon_key));
                    (remote, auth_client)
                }
                Err(InfraError::InvalidConfig(reason)) => {
                    let offline = Arc::new(UnconfiguredRemote::new(reason.clone()));
                    offline_reason = Some(reason);
                    let remote: Arc<dyn RemoteTaskStore> = offline.clone();
                    let auth_client: Arc<dyn AuthHttpClient> = offline;
                    (remote, auth_client)
                }
                Err(error) => return Err(error),
            };

        let state = Self::with_collaborators(
            workspace_root,
            Collaborators {
                remote,
                auth_client,
                session_store: Arc::new(KeyringSessionStore::default()),
                cache: Arc::new(SqliteFallbackCache::new(&bootstrap.database_path)),
                window: Arc::new(HeadlessWindow::new(&bootstrap.window_state_path)),
            },
        )?;
        if let Some(reason) = offline_reason {
            state.log_info("bootstrap", &format!("remote store disabled: {reason}"));
        }
        Ok(state)
    }

    pub fn with_collaborators(workspace_root: PathBuf, collaborators: Collaborators) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let timezone = read_timezone(&bootstrap.config_dir)?;
        let clock = LocalClock::from_name(timezone.as_deref()).map_err(InfraError::InvalidConfig)?;
        let timer = read_timer_settings(&bootstrap.config_dir)?;
        let timer_config = TimerConfig {
            work_seconds: timer.work_seconds,
            break_seconds: timer.break_seconds,
            flush_threshold_seconds: timer.flush_threshold_seconds,
        }
        .normalized();

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            clock,
            timer_config,
            tick_period: TICK_PERIOD,
            now_provider: Arc::new(Utc::now),
            auth: AuthManager::new(collaborators.session_store, collaborators.auth_client),
            sync: SyncReconciler::new(collaborators.remote, collaborators.cache),
            window: collaborators.window,
            runtime: Mutex::new(RuntimeState::new(timer_config)),
            log_guard: Mutex::new(()),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.auth = self.auth.with_now_provider(Arc::clone(&now_provider));
        self.now_provider = now_provider;
        self
    }

    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn timer_config(&self) -> TimerConfig {
        self.timer_config
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<Session>> {
        self.auth.subscribe()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    fn today(&self) -> NaiveDate {
        self.clock.today(self.now())
    }
}

#[derive(Debug)]
struct RuntimeState {
    store: TaskStore,
    settings: Settings,
    session: Option<Session>,
    loaded: bool,
    current: Option<TaskId>,
    selection: Selection,
    focus_universe: Option<Vec<TaskId>>,
    focus: FocusController,
    creates_in_flight: HashSet<TaskId>,
    deleted_in_flight: HashSet<TaskId>,
    epoch: u64,
}

impl RuntimeState {
    fn new(timer_config: TimerConfig) -> Self {
        Self {
            store: TaskStore::default(),
            settings: Settings::default(),
            session: None,
            loaded: false,
            current: None,
            selection: Selection::default(),
            focus_universe: None,
            focus: FocusController::new(timer_config),
            creates_in_flight: HashSet::new(),
            deleted_in_flight: HashSet::new(),
            epoch: 0,
        }
    }

    fn sync_context(&self) -> SyncContext {
        SyncContext {
            session: self.session.clone(),
            loaded: self.loaded,
            tasks: self.store.tasks().to_vec(),
        }
    }

    fn focus_ids(&self, today: NaiveDate) -> Vec<TaskId> {
        match &self.focus_universe {
            Some(ids) => ids
                .iter()
                .filter(|id| self.store.get(id).is_some_and(|task| !task.completed))
                .cloned()
                .collect(),
            None => {
                let tasks = self.store.tasks();
                partition::overdue(tasks, today)
                    .into_iter()
                    .chain(partition::today_or_unscheduled(tasks, today))
                    .map(|task| task.id.clone())
                    .collect()
            }
        }
    }

    fn retarget(&mut self, old: &TaskId, new: &TaskId) {
        if self.current.as_ref() == Some(old) {
            self.current = Some(new.clone());
        }
        self.selection.retarget(old, new);
        if let Some(universe) = &mut self.focus_universe {
            for id in universe.iter_mut().filter(|id| *id == old) {
                *id = new.clone();
            }
        }
        self.focus.retarget(old, new);
    }

    fn remove_task(&mut self, id: &TaskId, today: NaiveDate) -> (Option<Task>, Vec<FocusEvent>) {
        let before = self.focus_ids(today);
        let events = self.focus.task_removed(&mut self.store, id);
        let Some(removed) = self.store.delete(id) else {
            return (None, events);
        };
        self.selection.remove(id);
        if let Some(universe) = &mut self.focus_universe {
            universe.retain(|candidate| candidate != id);
        }
        if self.current.as_ref() == Some(id) {
            let remaining = self.focus_ids(today);
            self.current = advance_after_removal(&before, id, &remaining);
        }
        (Some(removed), events)
    }

    fn sign_out(&mut self) {
        self.focus.reset();
        self.store.clear();
        self.settings = Settings::default();
        self.session = None;
        self.loaded = false;
        self.current = None;
        self.selection.clear();
        self.focus_universe = None;
        self.creates_in_flight.clear();
        self.deleted_in_flight.clear();
        self.epoch += 1;
    }
}

struct SyncContext {
    session: Option<Session>,
    loaded: bool,
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatusResponse {
    pub signed_in: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub confirmation_required: bool,
}

impl AuthStatusResponse {
    fn from_session(session: Option<&Session>) -> Self {
        Self {
            signed_in: session.is_some(),
            user_id: session.map(|session| session.user_id.clone()),
            email: session.and_then(|session| session.email.clone()),
            confirmation_required: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub source: LoadSource,
    pub task_count: usize,
    pub settings: Settings,
    pub current_task_id: Option<TaskId>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskListResponse {
    pub view: TaskView,
    pub tasks: Vec<Task>,
    pub current_task_id: Option<TaskId>,
    pub next_task_id: Option<TaskId>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DateGroupResponse {
    pub date: Option<NaiveDate>,
    pub tasks: Vec<Task>,
}

impl From<DateGroup<'_>> for DateGroupResponse {
    fn from(group: DateGroup<'_>) -> Self {
        Self {
            date: group.date,
            tasks: group.tasks.into_iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayColumnResponse {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub tasks: Vec<Task>,
}

impl From<DayColumn<'_>> for DayColumnResponse {
    fn from(column: DayColumn<'_>) -> Self {
        Self {
            date: column.date,
            weekday: column.weekday,
            tasks: column.tasks.into_iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub completed: bool,
    pub next_task_id: Option<TaskId>,
}

pub async fn sign_up_impl(state: &AppState, email: String, password: String) -> Result<AuthStatusResponse, InfraError> {
    let Some(session) = state.auth.sign_up(&email, &password).await? else {
        state.log_info("sign_up", "account created; email confirmation pending");
        return Ok(AuthStatusResponse {
            confirmation_required: true,
            ..AuthStatusResponse::from_session(None)
        });
    };
    state.log_info("sign_up", &format!("signed up user_id={}", session.user_id));
    adopt_session(state, session.clone())?;
    load_impl(state).await?;
    Ok(AuthStatusResponse::from_session(Some(&session)))
}

pub async fn sign_in_impl(state: &AppState, email: String, password: String) -> Result<AuthStatusResponse, InfraError> {
    let session = state.auth.sign_in(&email, &password).await?;
    state.log_info("sign_in", &format!("signed in user_id={}", session.user_id));
    adopt_session(state, session.clone())?;
    load_impl(state).await?;
    Ok(AuthStatusResponse::from_session(Some(&session)))
}

pub async fn sign_out_impl(state: &AppState) -> Result<AuthStatusResponse, InfraError> {
    if let Err(error) = state.auth.sign_out().await {
        state.log_error("sign_out", &format!("remote sign-out failed: {error}"));
    }
    lock_runtime(state)?.sign_out();
    state.sync.clear_local()?;
    present_focus(state, "sign_out", &FocusPresentation::default());
    state.log_info("sign_out", "signed out and cleared local state");
    Ok(AuthStatusResponse::from_session(None))
}

pub async fn restore_session_impl(state: &AppState) -> Result<AuthStatusResponse, InfraError> {
    let session = match state.auth.ensure_session().await {
        Ok(result) => result.into_session(),
        Err(error) => {
            state.log_error("restore_session", &format!("session refresh failed: {error}"));
            state.auth.current_session()?
        }
    };
    if let Some(session) = &session {
        adopt_session(state, session.clone())?;
    }
    load_impl(state).await?;
    state.log_info(
        "restore_session",
        &format!("restored signed_in={}", session.is_some()),
    );
    Ok(AuthStatusResponse::from_session(session.as_ref()))
}

pub fn session_status_impl(state: &AppState) -> Result<AuthStatusResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(AuthStatusResponse::from_session(runtime.session.as_ref()))
}

/// Replaces the local list with the remote one, or the cache when the remote
/// is unreachable. A running timer is stopped and synced first. Provisional
/// tasks that came back from the cache without a create in flight get their
/// create re-issued; a failed re-issue keeps the task for the next load.
pub async fn load_impl(state: &AppState) -> Result<LoadResponse, InfraError> {
    let command = "load";
    let (session, epoch, stopped) = {
        let mut guard = lock_runtime(state)?;
        let runtime = &mut *guard;
        let events = runtime.focus.stop(&mut runtime.store);
        let stopped = (!events.is_empty()).then(|| (events, runtime.focus.snapshot(), runtime.sync_context()));
        (runtime.session.clone(), runtime.epoch, stopped)
    };
    if let Some((events, snapshot, context)) = stopped {
        log_focus_events(state, command, &events);
        present_focus(state, command, &presentation_of(&snapshot));
        sync_tasks(state, command, context).await;
    }

    let loaded = match &session {
        Some(session) => match state.sync.load(session).await {
            Ok(loaded) => loaded,
            Err(error) => {
                if error.is_unauthorized() {
                    force_logout(state, command, &error.to_string());
                }
                return Err(error);
            }
        },
        None => state.sync.load_local()?,
    };
    let persisted = match state.window.persisted_focus() {
        Ok(persisted) => persisted,
        Err(error) => {
            state.log_error(command, &format!("window state unreadable: {error}"));
            None
        }
    };

    let source = loaded.source;
    let orphans = {
        let mut guard = lock_runtime(state)?;
        let runtime = &mut *guard;
        if runtime.epoch != epoch {
            return Err(InfraError::Unauthorized("signed out while loading".to_string()));
        }
        runtime.focus.reset();
        runtime.store.replace_all(loaded.tasks);
        runtime.settings = loaded.settings;
        runtime.loaded = true;
        runtime.selection.clear();
        runtime.focus_universe = None;
        runtime.current = runtime
            .current
            .take()
            .filter(|id| runtime.store.get(id).is_some_and(|task| !task.completed));
        if let Some(persisted) = persisted.filter(|persisted| persisted.active) {
            runtime.focus.set_minimized(persisted.minimized);
            if let Some(task_id) = persisted
                .task_id
                .filter(|id| runtime.store.get(id).is_some_and(|task| !task.completed))
            {
                runtime.current = Some(task_id);
            }
        }
        let orphans = match &session {
            Some(_) => runtime
                .store
                .tasks()
                .iter()
                .filter(|task| task.id.is_provisional() && !runtime.creates_in_flight.contains(&task.id))
                .cloned()
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };
        for orphan in &orphans {
            runtime.creates_in_flight.insert(orphan.id.clone());
        }
        orphans
    };

    if let Some(session) = &session {
        let today = state.today();
        for orphan in &orphans {
            state.log_info(command, &format!("re-issuing create for cached task {}", orphan.id));
            if let Err(error) = finish_create(state, command, session, orphan, epoch, today, CreateFailure::Keep).await {
                if error.is_unauthorized() {
                    break;
                }
            }
        }
    }

    let response = {
        let runtime = lock_runtime(state)?;
        LoadResponse {
            source,
            task_count: runtime.store.len(),
            settings: runtime.settings.clone(),
            current_task_id: runtime.current.clone(),
        }
    };
    state.log_info(
        command,
        &format!("loaded {} tasks source={:?}", response.task_count, response.source),
    );
    Ok(response)
}

pub fn list_tasks_impl(state: &AppState, view: Option<String>) -> Result<TaskListResponse, InfraError> {
    let view = parse_view(view.as_deref())?;
    let today = state.today();
    let runtime = lock_runtime(state)?;
    let tasks = partition::view(runtime.store.tasks(), view, today)
        .into_iter()
        .cloned()
        .collect();
    let focus_ids = runtime.focus_ids(today);
    let focus_tasks = focus_ids
        .iter()
        .filter_map(|id| runtime.store.get(id))
        .collect::<Vec<_>>();
    let pointer = current_and_next(&focus_tasks, runtime.current.as_ref());
    Ok(TaskListResponse {
        view,
        tasks,
        current_task_id: pointer.current.map(|task| task.id.clone()),
        next_task_id: pointer.next.map(|task| task.id.clone()),
    })
}

pub fn list_grouped_impl(state: &AppState, view: Option<String>) -> Result<Vec<DateGroupResponse>, InfraError> {
    let view = parse_view(view.as_deref())?;
    let today = state.today();
    let runtime = lock_runtime(state)?;
    let tasks = partition::view(runtime.store.tasks(), view, today);
    Ok(partition::group_by_date(&tasks)
        .into_iter()
        .map(DateGroupResponse::from)
        .collect())
}

pub fn week_view_impl(state: &AppState, date: Option<String>) -> Result<Vec<DayColumnResponse>, InfraError> {
    let anchor = match date {
        Some(raw) => parse_date_input(&raw, "date")?,
        None => state.today(),
    };
    let runtime = lock_runtime(state)?;
    let tasks = runtime.store.tasks().iter().collect::<Vec<_>>();
    Ok(partition::week_view(&tasks, anchor)
        .into_iter()
        .map(DayColumnResponse::from)
        .collect())
}

pub fn daily_summary_impl(state: &AppState, date: Option<String>) -> Result<DailySummary, InfraError> {
    let day = match date {
        Some(raw) => parse_date_input(&raw, "date")?,
        None => state.today(),
    };
    let runtime = lock_runtime(state)?;
    Ok(partition::daily_summary(
        runtime.store.tasks(),
        day,
        &runtime.settings,
        |instant| state.clock.local_date(instant),
    ))
}

pub async fn add_task_impl(
    state: &AppState,
    title: String,
    scheduled_date: Option<String>,
    notes: Option<String>,
) -> Result<Task, InfraError> {
    let command = "add_task";
    if title.trim().is_empty() {
        return Err(InfraError::Validation("task title must not be empty".to_string()));
    }
    let scheduled_date = scheduled_date
        .as_deref()
        .map(|raw| parse_date_input(raw, "scheduled_date"))
        .transpose()?;
    let now = state.now();
    let today = state.clock.today(now);

    let (task, context, create_with, epoch) = {
        let mut guard = lock_runtime(state)?;
        let runtime = &mut *guard;
        let task = runtime
            .store
            .add(
                NewTask {
                    id: None,
                    title,
                    scheduled_date,
                    recurring: None,
                    notes,
                },
                now,
            )
            .ok_or_else(|| InfraError::Validation("task could not be added".to_string()))?;
        let create_with = runtime.session.clone().filter(|_| runtime.loaded);
        if create_with.is_some() {
            runtime.creates_in_flight.insert(task.id.clone());
        }
        (task, runtime.sync_context(), create_with, runtime.epoch)
    };
    state.log_info(command, &format!("added task id={}", task.id));
    sync_tasks(state, command, context).await;

    let Some(session) = create_with else {
        return Ok(task);
    };

    finish_create(state, command, &session, &task, epoch, today, CreateFailure::RollBack).await
}

/// Sends the create for a provisional task and settles the answer: the
/// durable id replaces the provisional one and a task deleted meanwhile is
/// deleted remotely. A failed create removes the task only under
/// `CreateFailure::RollBack`.
async fn finish_create(
    state: &AppState,
    command: &str,
    session: &Session,
    task: &Task,
    epoch: u64,
    today: NaiveDate,
    on_failure: CreateFailure,
) -> Result<Task, InfraError> {
    match state.sync.create(session, task).await {
        Ok(durable) => {
            let outcome = {
                let mut guard = lock_runtime(state)?;
                let runtime = &mut *guard;
                runtime.creates_in_flight.remove(&task.id);
                if runtime.epoch != epoch {
                    CreateOutcome::Discarded
                } else if runtime.deleted_in_flight.remove(&task.id) {
                    CreateOutcome::DeletedLocally
                } else if runtime.store.reconcile_created(&task.id, &durable) {
                    runtime.retarget(&task.id, &durable.id);
                    let reconciled = runtime.store.get(&durable.id).cloned().unwrap_or_else(|| durable.clone());
                    CreateOutcome::Reconciled(reconciled, runtime.sync_context())
                } else {
                    CreateOutcome::Discarded
                }
            };
            match outcome {
                CreateOutcome::Reconciled(reconciled, context) => {
                    state.log_info(
                        command,
                        &format!("reconciled task {} as id={}", task.id, reconciled.id),
                    );
                    sync_tasks(state, command, context).await;
                    Ok(reconciled)
                }
                CreateOutcome::DeletedLocally => {
                    state.log_info(
                        command,
                        &format!("task {} was deleted while creating; removing id={}", task.id, durable.id),
                    );
                    if let Err(error) = state.sync.delete(session, &durable.id).await {
                        report_remote_error(state, command, "remote delete", &error);
                    }
                    Ok(durable)
                }
                CreateOutcome::Discarded => {
                    state.log_info(command, &format!("dropped create answer for {}", task.id));
                    Ok(durable)
                }
            }
        }
        Err(error) => {
            let context = {
                let mut guard = lock_runtime(state)?;
                let runtime = &mut *guard;
                runtime.creates_in_flight.remove(&task.id);
                runtime.deleted_in_flight.remove(&task.id);
                let roll_back = on_failure == CreateFailure::RollBack
                    && runtime.epoch == epoch
                    && runtime.store.contains(&task.id);
                if roll_back {
                    runtime.remove_task(&task.id, today);
                }
                roll_back.then(|| runtime.sync_context())
            };
            let outcome = if context.is_some() { "rolled back" } else { "kept" };
            state.log_error(
                command,
                &format!("create failed; {outcome} task {}: {error}", task.id),
            );
            if error.is_unauthorized() {
                force_logout(state, command, &error.to_string());
            } else if let Some(context) = context {
                sync_tasks(state, command, context).await;
            }
            Err(error)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateFailure {
    RollBack,
    Keep,
}

enum CreateOutcome {
    Reconciled(Task, SyncContext),
    DeletedLocally,
    Discarded,
}

pub async fn complete_task_impl(state: &AppState, task_id: TaskId) -> Result<CompletionResponse, InfraError> {
    let command = "complete_task";
    mutate_tasks(state, command, |runtime, now, today| {
        let before = runtime.focus_ids(today);
        let focused = runtime.focus.task_id() == Some(&task_id);
        let completed = if focused {
            runtime
                .focus
                .complete(&mut runtime.store, &before, now)
                .iter()
                .any(|event| matches!(event, FocusEvent::TaskCompleted { .. }))
        } else {
            runtime.store.complete(&task_id, now)
        };
        if !completed {
            return Ok((
                CompletionResponse {
                    completed: false,
                    next_task_id: None,
                },
                None,
            ));
        }

        runtime.selection.remove(&task_id);
        let remaining = runtime.focus_ids(today);
        let next = advance_after_removal(&before, &task_id, &remaining);
        if focused || runtime.current.as_ref() == Some(&task_id) {
            runtime.current = next.clone();
        }
        if focused {
            present_focus(state, command, &presentation_of(&runtime.focus.snapshot()));
        }
        Ok((
            CompletionResponse {
                completed: true,
                next_task_id: next,
            },
            Some(format!("completed task id={task_id}")),
        ))
    })
    .await
}

pub async fn restore_task_impl(state: &AppState, task_id: TaskId) -> Result<bool, InfraError> {
    apply_action(state, "restore_task", TaskAction::Restore(task_id)).await
}

pub async fn delete_task_impl(state: &AppState, task_id: TaskId) -> Result<bool, InfraError> {
    let command = "delete_task";
    let remote_delete = mutate_tasks(state, command, |runtime, _now, today| {
        let (removed, events) = runtime.remove_task(&task_id, today);
        if removed.is_none() {
            return Ok((None, None));
        }
        if runtime.creates_in_flight.contains(&task_id) {
            runtime.deleted_in_flight.insert(task_id.clone());
        }
        if events.iter().any(|event| matches!(event, FocusEvent::Stopped { .. })) {
            present_focus(state, command, &presentation_of(&runtime.focus.snapshot()));
        }
        let session = runtime.session.clone().filter(|_| runtime.loaded);
        Ok((Some(session), Some(format!("deleted task id={task_id}"))))
    })
    .await?;

    let Some(session) = remote_delete else {
        return Ok(false);
    };
    if let Some(session) = fresh_session(state, command, session).await {
        if let Err(error) = state.sync.delete(&session, &task_id).await {
            report_remote_error(state, command, "remote delete", &error);
        }
    }
    Ok(true)
}

pub async fn reschedule_task_impl(state: &AppState, task_id: TaskId, date: Option<String>) -> Result<bool, InfraError> {
    let date = date
        .as_deref()
        .map(|raw| parse_date_input(raw, "date"))
        .transpose()?;
    apply_action(state, "reschedule_task", TaskAction::Reschedule { id: task_id, date }).await
}

pub async fn reschedule_overdue_impl(state: &AppState) -> Result<bool, InfraError> {
    let today = state.today();
    apply_action(state, "reschedule_overdue", TaskAction::RescheduleOverdue { today }).await
}

pub async fn retitle_task_impl(state: &AppState, task_id: TaskId, title: String) -> Result<bool, InfraError> {
    if title.trim().is_empty() {
        return Err(InfraError::Validation("task title must not be empty".to_string()));
    }
    apply_action(state, "retitle_task", TaskAction::Retitle { id: task_id, title }).await
}

pub async fn set_task_notes_impl(state: &AppState, task_id: TaskId, notes: Option<String>) -> Result<bool, InfraError> {
    apply_action(state, "set_task_notes", TaskAction::SetNotes { id: task_id, notes }).await
}

pub async fn set_task_recurring_impl(
    state: &AppState,
    task_id: TaskId,
    recurring: Option<String>,
) -> Result<bool, InfraError> {
    let recurring = recurring.as_deref().map(parse_recurrence).transpose()?;
    apply_action(
        state,
        "set_task_recurring",
        TaskAction::SetRecurring { id: task_id, recurring },
    )
    .await
}

pub async fn reorder_tasks_impl(state: &AppState, drag: TaskId, target: TaskId) -> Result<bool, InfraError> {
    apply_action(state, "reorder_tasks", TaskAction::Reorder { drag, target }).await
}

pub fn set_current_task_impl(state: &AppState, task_id: Option<TaskId>) -> Result<Option<TaskId>, InfraError> {
    let mut runtime = lock_runtime(state)?;
    if let Some(task_id) = &task_id {
        if !runtime.store.get(task_id).is_some_and(|task| !task.completed) {
            return Err(InfraError::Validation(format!("task {task_id} cannot become current")));
        }
    }
    runtime.current = task_id.clone();
    drop(runtime);
    state.log_info(
        "set_current_task",
        &format!("current task={}", task_id.as_ref().map_or("none".to_string(), ToString::to_string)),
    );
    Ok(task_id)
}

pub async fn focus_start_impl(
    state: &Arc<AppState>,
    task_id: Option<TaskId>,
    mode: Option<String>,
) -> Result<FocusSnapshot, InfraError> {
    let mode = mode
        .as_deref()
        .map(|raw| TimerMode::parse(raw).ok_or_else(|| InfraError::Validation(format!("unknown timer mode: {raw}"))))
        .transpose()?;
    let task_id = match task_id {
        Some(task_id) => task_id,
        None => lock_runtime(state)?
            .current
            .clone()
            .ok_or_else(|| InfraError::Validation("no task to focus on".to_string()))?,
    };
    start_focus(state, "focus_start", task_id, mode).await
}

pub async fn focus_pause_impl(state: &AppState) -> Result<FocusSnapshot, InfraError> {
    let command = "focus_pause";
    focus_transition(state, command, |runtime| runtime.focus.pause(&mut runtime.store)).await
}

pub async fn focus_resume_impl(state: &Arc<AppState>) -> Result<FocusSnapshot, InfraError> {
    let snapshot = focus_transition(state, "focus_resume", |runtime| runtime.focus.resume()).await?;
    ensure_ticker(state, "focus_resume")?;
    Ok(snapshot)
}

pub async fn focus_stop_impl(state: &AppState) -> Result<FocusSnapshot, InfraError> {
    focus_transition(state, "focus_stop", |runtime| runtime.focus.stop(&mut runtime.store)).await
}

pub async fn focus_complete_impl(state: &AppState) -> Result<CompletionResponse, InfraError> {
    let task_id = lock_runtime(state)?
        .focus
        .task_id()
        .cloned()
        .ok_or_else(|| InfraError::Validation("no task is being focused".to_string()))?;
    complete_task_impl(state, task_id).await
}

pub async fn focus_skip_break_impl(state: &Arc<AppState>) -> Result<FocusSnapshot, InfraError> {
    let snapshot = focus_transition(state, "focus_skip_break", |runtime| runtime.focus.skip_break()).await?;
    ensure_ticker(state, "focus_skip_break")?;
    Ok(snapshot)
}

pub fn focus_rest_impl(state: &AppState) -> Result<FocusSnapshot, InfraError> {
    let command = "focus_rest";
    let (rested, snapshot) = {
        let mut runtime = lock_runtime(state)?;
        let rested = runtime.focus.rest();
        (rested, runtime.focus.snapshot())
    };
    if !rested {
        return Err(InfraError::Validation(format!(
            "cannot rest while focus is {}",
            snapshot.state.as_str()
        )));
    }
    if let Err(error) = state.window.set_background_presentation(true) {
        state.log_error(command, &format!("window update failed: {error}"));
    }
    state.log_info(command, "resting");
    Ok(snapshot)
}

pub async fn focus_back_to_work_impl(state: &Arc<AppState>) -> Result<FocusSnapshot, InfraError> {
    let command = "focus_back_to_work";
    let next = {
        let mut runtime = lock_runtime(state)?;
        let next = runtime.focus.back_to_work();
        if let Some(next) = &next {
            runtime.current = Some(next.clone());
        }
        next
    };
    let Some(next) = next else {
        return Err(InfraError::Validation("no next task is waiting".to_string()));
    };
    if let Err(error) = state.window.set_background_presentation(false) {
        state.log_error(command, &format!("window update failed: {error}"));
    }
    start_focus(state, command, next, None).await
}

pub fn focus_set_minimized_impl(state: &AppState, minimized: bool) -> Result<FocusSnapshot, InfraError> {
    let snapshot = {
        let mut runtime = lock_runtime(state)?;
        runtime.focus.set_minimized(minimized);
        runtime.focus.snapshot()
    };
    if !matches!(snapshot.state, FocusState::Idle) {
        present_focus(state, "focus_set_minimized", &presentation_of(&snapshot));
    }
    state.log_info("focus_set_minimized", &format!("minimized={minimized}"));
    Ok(snapshot)
}

pub fn focus_set_mode_impl(state: &AppState, mode: String) -> Result<FocusSnapshot, InfraError> {
    let mode = TimerMode::parse(&mode).ok_or_else(|| InfraError::Validation(format!("unknown timer mode: {mode}")))?;
    let mut runtime = lock_runtime(state)?;
    runtime.focus.set_mode(mode);
    Ok(runtime.focus.snapshot())
}

pub fn focus_state_impl(state: &AppState) -> Result<FocusSnapshot, InfraError> {
    Ok(lock_runtime(state)?.focus.snapshot())
}

pub fn toggle_select_impl(state: &AppState, task_id: TaskId) -> Result<Vec<TaskId>, InfraError> {
    let mut runtime = lock_runtime(state)?;
    if !runtime.store.get(&task_id).is_some_and(|task| !task.completed) {
        return Err(InfraError::Validation(format!("task {task_id} cannot be selected")));
    }
    runtime.selection.toggle(task_id);
    Ok(runtime.selection.ids().to_vec())
}

pub async fn start_selected_impl(state: &Arc<AppState>) -> Result<FocusSnapshot, InfraError> {
    let first = {
        let mut runtime = lock_runtime(state)?;
        let ids = runtime.selection.take();
        let Some(first) = ids.first().cloned() else {
            return Err(InfraError::Validation("no tasks selected".to_string()));
        };
        runtime.focus_universe = Some(ids);
        runtime.current = Some(first.clone());
        first
    };
    start_focus(state, "start_selected", first, None).await
}

pub async fn complete_selected_impl(state: &AppState) -> Result<Vec<TaskId>, InfraError> {
    let command = "complete_selected";
    mutate_tasks(state, command, |runtime, now, _today| {
        let focus_selected = runtime
            .focus
            .task_id()
            .is_some_and(|id| runtime.selection.contains(id));
        if focus_selected {
            runtime.focus.stop(&mut runtime.store);
            present_focus(state, command, &presentation_of(&runtime.focus.snapshot()));
        }
        let completed = complete_selected(&mut runtime.selection, &mut runtime.store, now);
        runtime.current = None;
        runtime.focus_universe = None;
        let message = (!completed.is_empty()).then(|| format!("completed {} selected tasks", completed.len()));
        Ok((completed, message))
    })
    .await
}

pub fn clear_selection_impl(state: &AppState) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    runtime.selection.clear();
    runtime.focus_universe = None;
    Ok(())
}

pub fn get_settings_impl(state: &AppState) -> Result<Settings, InfraError> {
    Ok(lock_runtime(state)?.settings.clone())
}

pub async fn set_theme_impl(state: &AppState, theme: String) -> Result<Settings, InfraError> {
    let theme = Theme::parse(&theme).ok_or_else(|| InfraError::Validation(format!("unknown theme: {theme}")))?;
    update_settings(state, "set_theme", |settings| settings.set_theme(theme)).await
}

pub async fn set_daily_goal_impl(state: &AppState, goal: i64) -> Result<Settings, InfraError> {
    if goal <= 0 || u32::try_from(goal).is_err() {
        return Err(InfraError::Validation(format!("daily goal must be a positive count, got {goal}")));
    }
    update_settings(state, "set_daily_goal", |settings| settings.set_daily_goal(goal)).await
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::StateLock(format!("runtime state lock poisoned: {error}")))
}

fn adopt_session(state: &AppState, session: Session) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    let same_user = runtime
        .session
        .as_ref()
        .is_some_and(|current| current.user_id == session.user_id);
    if !same_user {
        runtime.loaded = false;
    }
    runtime.session = Some(session);
    Ok(())
}

async fn mutate_tasks<T, F>(state: &AppState, command: &str, mutation: F) -> Result<T, InfraError>
where
    F: FnOnce(&mut RuntimeState, DateTime<Utc>, NaiveDate) -> Result<(T, Option<String>), InfraError>,
{
    let now = state.now();
    let today = state.clock.today(now);
    let (value, changed) = {
        let mut guard = lock_runtime(state)?;
        let runtime = &mut *guard;
        let (value, message) = mutation(runtime, now, today)?;
        (value, message.map(|message| (message, runtime.sync_context())))
    };
    match changed {
        Some((message, context)) => {
            state.log_info(command, &message);
            sync_tasks(state, command, context).await;
        }
        None => state.log_info(command, "no change"),
    }
    Ok(value)
}

async fn apply_action(state: &AppState, command: &str, action: TaskAction) -> Result<bool, InfraError> {
    let name = action.name();
    mutate_tasks(state, command, |runtime, now, _today| {
        let changed = runtime.store.apply(action, now);
        Ok((changed, changed.then(|| format!("applied {name}"))))
    })
    .await
}

async fn start_focus(
    state: &Arc<AppState>,
    command: &str,
    task_id: TaskId,
    mode: Option<TimerMode>,
) -> Result<FocusSnapshot, InfraError> {
    let now = state.now();
    let (snapshot, events, context) = {
        let mut guard = lock_runtime(state)?;
        let runtime = &mut *guard;
        if !runtime.store.get(&task_id).is_some_and(|task| !task.completed) {
            return Err(InfraError::Validation(format!("task {task_id} cannot be focused")));
        }
        let mut events = Vec::new();
        if let Some(mode) = mode.filter(|mode| *mode != runtime.focus.mode()) {
            events.extend(runtime.focus.stop(&mut runtime.store));
            runtime.focus.set_mode(mode);
        }
        events.extend(runtime.focus.start(&mut runtime.store, &task_id, now));
        runtime.current = Some(task_id.clone());
        (runtime.focus.snapshot(), events, runtime.sync_context())
    };
    log_focus_events(state, command, &events);
    present_focus(state, command, &presentation_of(&snapshot));
    ensure_ticker(state, command)?;
    sync_tasks(state, command, context).await;
    Ok(snapshot)
}

async fn focus_transition<F>(state: &AppState, command: &str, transition: F) -> Result<FocusSnapshot, InfraError>
where
    F: FnOnce(&mut RuntimeState) -> Vec<FocusEvent>,
{
    let (snapshot, events, context) = {
        let mut guard = lock_runtime(state)?;
        let runtime = &mut *guard;
        let events = transition(runtime);
        let flushed = events
            .iter()
            .any(|event| matches!(event, FocusEvent::Flushed { .. } | FocusEvent::Stopped { .. }));
        (
            runtime.focus.snapshot(),
            events,
            flushed.then(|| runtime.sync_context()),
        )
    };
    if events.is_empty() {
        state.log_info(command, &format!("no change in state {}", snapshot.state.as_str()));
    }
    log_focus_events(state, command, &events);
    present_focus(state, command, &presentation_of(&snapshot));
    if let Some(context) = context {
        sync_tasks(state, command, context).await;
    }
    Ok(snapshot)
}

fn ensure_ticker(state: &Arc<AppState>, command: &str) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    if !runtime.focus.needs_ticker() {
        return Ok(());
    }
    let weak = Arc::downgrade(state);
    let handle = spawn_ticker(state.tick_period, move |generation, steps| {
        let weak = weak.clone();
        async move {
            match weak.upgrade() {
                Some(state) => on_focus_tick(state, generation, steps).await,
                None => TickControl::Stop,
            }
        }
    });
    let generation = handle.generation();
    runtime.focus.attach_ticker(handle);
    drop(runtime);
    state.log_info(command, &format!("ticker generation={generation} started"));
    Ok(())
}

async fn on_focus_tick(state: Arc<AppState>, generation: u64, steps: u64) -> TickControl {
    let command = "focus_tick";
    let (events, flushed, context, owned, needs_ticker) = {
        let Ok(mut guard) = state.runtime.lock() else {
            return TickControl::Stop;
        };
        let runtime = &mut *guard;
        if !runtime.focus.accepts_tick(generation) {
            return TickControl::Stop;
        }
        let events = runtime.focus.advance(&mut runtime.store, steps);
        let flushed = events.iter().any(|event| {
            matches!(
                event,
                FocusEvent::Flushed { .. } | FocusEvent::PomodoroCompleted { .. }
            )
        });
        (
            events,
            flushed,
            runtime.sync_context(),
            runtime.focus.accepts_tick(generation),
            runtime.focus.needs_ticker(),
        )
    };

    let transitions = events
        .iter()
        .filter(|event| !matches!(event, FocusEvent::Flushed { .. }))
        .cloned()
        .collect::<Vec<_>>();
    log_focus_events(&state, command, &transitions);

    if flushed {
        sync_tasks(&state, command, context).await;
    }

    if needs_ticker {
        if let Err(error) = ensure_ticker(&state, command) {
            state.log_error(command, &format!("ticker restart failed: {error}"));
        }
        return TickControl::Stop;
    }
    if owned { TickControl::Continue } else { TickControl::Stop }
}

async fn update_settings<F>(state: &AppState, command: &str, update: F) -> Result<Settings, InfraError>
where
    F: FnOnce(&mut Settings) -> bool,
{
    let (settings, context) = {
        let mut runtime = lock_runtime(state)?;
        let changed = update(&mut runtime.settings);
        (
            runtime.settings.clone(),
            changed.then(|| (runtime.session.clone(), runtime.loaded)),
        )
    };
    let Some((session, loaded)) = context else {
        state.log_info(command, "no change");
        return Ok(settings);
    };
    state.log_info(command, &format!("theme={} daily_goal={}", settings.theme.as_str(), settings.daily_goal));
    let session = fresh_session(state, command, session).await;
    match state.sync.sync_settings(session.as_ref(), loaded, &settings).await {
        Ok(outcome) => log_sync_outcome(state, command, "settings", outcome),
        Err(error) => report_remote_error(state, command, "settings sync", &error),
    }
    Ok(settings)
}

async fn sync_tasks(state: &AppState, command: &str, context: SyncContext) {
    let session = fresh_session(state, command, context.session).await;
    match state
        .sync
        .sync_tasks(session.as_ref(), context.loaded, &context.tasks)
        .await
    {
        Ok(outcome) => log_sync_outcome(state, command, "tasks", outcome),
        Err(error) => report_remote_error(state, command, "task sync", &error),
    }
}

async fn fresh_session(state: &AppState, command: &str, session: Option<Session>) -> Option<Session> {
    let session = session?;
    if state.auth.is_session_valid(&session) {
        return Some(session);
    }
    match state.auth.ensure_session().await {
        Ok(result) => match result.into_session() {
            Some(refreshed) => {
                if let Ok(mut runtime) = state.runtime.lock() {
                    let same_user = runtime
                        .session
                        .as_ref()
                        .is_some_and(|current| current.user_id == refreshed.user_id);
                    if same_user {
                        runtime.session = Some(refreshed.clone());
                    }
                }
                Some(refreshed)
            }
            None => {
                force_logout(state, command, "session expired");
                None
            }
        },
        Err(error) => {
            state.log_error(command, &format!("session refresh failed: {error}"));
            Some(session)
        }
    }
}

fn report_remote_error(state: &AppState, command: &str, operation: &str, error: &InfraError) {
    if error.is_unauthorized() {
        force_logout(state, command, &format!("{operation} rejected: {error}"));
    } else {
        state.log_error(command, &format!("{operation} failed: {error}"));
    }
}

fn force_logout(state: &AppState, command: &str, reason: &str) {
    state.log_error(command, &format!("forcing logout: {reason}"));
    match state.runtime.lock() {
        Ok(mut runtime) => runtime.sign_out(),
        Err(error) => state.log_error(command, &format!("runtime state lock poisoned: {error}")),
    }
    if let Err(error) = state.auth.clear_local() {
        state.log_error(command, &format!("clearing session failed: {error}"));
    }
    if let Err(error) = state.sync.clear_local() {
        state.log_error(command, &format!("clearing cache failed: {error}"));
    }
    present_focus(state, command, &FocusPresentation::default());
}

fn log_sync_outcome(state: &AppState, command: &str, subject: &str, outcome: SyncOutcome) {
    let message = match outcome {
        SyncOutcome::Synced => format!("{subject} synced"),
        SyncOutcome::SignedOut => format!("{subject} kept local; signed out"),
        SyncOutcome::NotLoaded => format!("{subject} kept local; remote state not loaded"),
        SyncOutcome::Suppressed { provisional } => {
            format!("{subject} sync held back; {provisional} creates pending")
        }
    };
    state.log_info(command, &message);
}

fn log_focus_events(state: &AppState, command: &str, events: &[FocusEvent]) {
    for event in events {
        let message = match event {
            FocusEvent::Started { task_id, mode } => format!("started task_id={task_id} mode={mode:?}"),
            FocusEvent::Paused { task_id } => format!("paused task_id={task_id}"),
            FocusEvent::Resumed { task_id } => format!("resumed task_id={task_id}"),
            FocusEvent::Flushed { task_id, seconds } => format!("flushed {seconds}s to task_id={task_id}"),
            FocusEvent::PomodoroCompleted { task_id, sessions } => {
                format!("pomodoro done task_id={task_id} sessions={sessions}")
            }
            FocusEvent::BreakStarted { seconds } => format!("break started seconds={seconds}"),
            FocusEvent::BreakFinished { auto_resumed } => format!("break finished auto_resumed={auto_resumed}"),
            FocusEvent::TaskCompleted { task_id, next } => format!(
                "completed task_id={task_id} next={}",
                next.as_ref().map_or("none".to_string(), ToString::to_string)
            ),
            FocusEvent::Stopped { task_id } => format!("stopped task_id={task_id}"),
        };
        state.log_info(command, &message);
    }
}

fn presentation_of(snapshot: &FocusSnapshot) -> FocusPresentation {
    FocusPresentation {
        active: !matches!(snapshot.state, FocusState::Idle),
        minimized: snapshot.minimized,
        task_id: snapshot.task_id.clone(),
    }
}

fn present_focus(state: &AppState, command: &str, presentation: &FocusPresentation) {
    if let Err(error) = state.window.set_focus_presentation(presentation) {
        state.log_error(command, &format!("window update failed: {error}"));
    }
}

fn parse_view(value: Option<&str>) -> Result<TaskView, InfraError> {
    match value {
        None => Ok(TaskView::default()),
        Some(raw) => TaskView::parse(raw).ok_or_else(|| InfraError::Validation(format!("unknown task view: {raw}"))),
    }
}

fn parse_date_input(value: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|error| InfraError::Validation(format!("{field_name} must be YYYY-MM-DD: {error}")))
}

fn parse_recurrence(value: &str) -> Result<Recurrence, InfraError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "daily" => Ok(Recurrence::Daily),
        "weekly" => Ok(Recurrence::Weekly),
        "monthly" => Ok(Recurrence::Monthly),
        other => Err(InfraError::Validation(format!("unknown recurrence: {other}"))),
    }
}
