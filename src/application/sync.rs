use crate::domain::models::{Session, Settings, Task, TaskId};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_cache::FallbackCache;
use crate::infrastructure::remote_client::RemoteTaskStore;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced,
    SignedOut,
    NotLoaded,
    Suppressed { provisional: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Remote,
    Fallback,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedState {
    pub tasks: Vec<Task>,
    pub settings: Settings,
    pub source: LoadSource,
}

pub struct SyncReconciler<R, C>
where
    R: RemoteTaskStore + ?Sized,
    C: FallbackCache + ?Sized,
{
    remote: Arc<R>,
    cache: Arc<C>,
    retry_policy: RetryPolicy,
}

impl<R, C> SyncReconciler<R, C>
where
    R: RemoteTaskStore + ?Sized,
    C: FallbackCache + ?Sized,
{
    pub fn new(remote: Arc<R>, cache: Arc<C>) -> Self {
        Self {
            remote,
            cache,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Bulk-replaces the remote task list. The cache is written first and
    /// regardless of the remote outcome; the bulk call is never retried.
    pub async fn sync_tasks(
        &self,
        session: Option<&Session>,
        loaded: bool,
        tasks: &[Task],
    ) -> Result<SyncOutcome, InfraError> {
        let mirrored = self.mirror_tasks(tasks);

        let outcome = match (session, loaded) {
            (None, _) => SyncOutcome::SignedOut,
            (Some(_), false) => SyncOutcome::NotLoaded,
            (Some(session), true) => {
                let provisional = tasks.iter().filter(|task| task.id.is_provisional()).count();
                if provisional > 0 {
                    SyncOutcome::Suppressed { provisional }
                } else {
                    self.remote.bulk_replace(session, tasks).await?;
                    SyncOutcome::Synced
                }
            }
        };

        mirrored?;
        Ok(outcome)
    }

    pub fn mirror_tasks(&self, tasks: &[Task]) -> Result<(), InfraError> {
        self.cache.save_tasks(tasks)
    }

    pub async fn sync_settings(
        &self,
        session: Option<&Session>,
        loaded: bool,
        settings: &Settings,
    ) -> Result<SyncOutcome, InfraError> {
        let mirrored = self.cache.save_settings(settings);
        let outcome = match (session, loaded) {
            (None, _) => SyncOutcome::SignedOut,
            (Some(_), false) => SyncOutcome::NotLoaded,
            (Some(session), true) => {
                self.remote.upsert_settings(session, settings).await?;
                SyncOutcome::Synced
            }
        };
        mirrored?;
        Ok(outcome)
    }

    pub async fn create(&self, session: &Session, task: &Task) -> Result<Task, InfraError> {
        let created = self.remote.create_task(session, task).await?;
        if created.id.is_provisional() {
            return Err(InfraError::Remote(
                "create response did not carry a durable id".to_string(),
            ));
        }
        Ok(created)
    }

    pub async fn delete(&self, session: &Session, id: &TaskId) -> Result<(), InfraError> {
        if id.is_provisional() {
            return Ok(());
        }
        self.remote.delete_task(session, id).await
    }

    pub async fn load(&self, session: &Session) -> Result<LoadedState, InfraError> {
        let remote = async {
            let tasks = self.with_retry(|| self.remote.list_tasks(session)).await?;
            let settings = self.with_retry(|| self.remote.get_settings(session)).await?;
            Ok::<_, InfraError>((tasks, settings))
        }
        .await;

        match remote {
            Ok((tasks, settings)) => {
                let settings = settings.unwrap_or_default();
                self.cache.save_tasks(&tasks)?;
                self.cache.save_settings(&settings)?;
                Ok(LoadedState {
                    tasks,
                    settings,
                    source: LoadSource::Remote,
                })
            }
            Err(error) if error.is_unauthorized() => Err(error),
            Err(_) => self.load_local(),
        }
    }

    pub fn load_local(&self) -> Result<LoadedState, InfraError> {
        let tasks = self.cache.load_tasks()?;
        let settings = self.cache.load_settings()?;
        let source = if tasks.is_none() && settings.is_none() {
            LoadSource::Empty
        } else {
            LoadSource::Fallback
        };
        Ok(LoadedState {
            tasks: tasks.unwrap_or_default(),
            settings: settings.unwrap_or_default(),
            source,
        })
    }

    pub fn clear_local(&self) -> Result<(), InfraError> {
        self.cache.clear_all()
    }

    async fn with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T, InfraError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InfraError>>,
    {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(u32::from(attempt)));
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    pub(crate) struct FakeRemote {
        pub tasks: Mutex<Vec<Task>>,
        pub settings: Mutex<Option<Settings>>,
        pub list_failures: Mutex<VecDeque<InfraError>>,
        pub bulk_failure: Mutex<Option<InfraError>>,
        pub create_failure: Mutex<Option<InfraError>>,
        pub create_gate: Mutex<Option<Arc<Notify>>>,
        pub bulk_calls: AtomicUsize,
        pub list_calls: AtomicUsize,
        pub create_calls: AtomicUsize,
        pub delete_calls: AtomicUsize,
        pub settings_calls: AtomicUsize,
        pub deleted: Mutex<Vec<TaskId>>,
        next_id: AtomicUsize,
    }

    impl FakeRemote {
        pub(crate) fn bulk_calls(&self) -> usize {
            self.bulk_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn stored_tasks(&self) -> Vec<Task> {
            self.tasks.lock().expect("tasks mutex poisoned").clone()
        }

        pub(crate) fn hold_creates(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.create_gate.lock().expect("gate mutex poisoned") = Some(Arc::clone(&gate));
            gate
        }
    }

    #[async_trait]
    impl RemoteTaskStore for FakeRemote {
        async fn list_tasks(&self, _session: &Session) -> Result<Vec<Task>, InfraError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.list_failures.lock().expect("failures mutex poisoned").pop_front() {
                return Err(error);
            }
            Ok(self.stored_tasks())
        }

        async fn create_task(&self, _session: &Session, task: &Task) -> Result<Task, InfraError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.create_gate.lock().expect("gate mutex poisoned").clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if let Some(error) = self.create_failure.lock().expect("failure mutex poisoned").take() {
                return Err(error);
            }
            let sequence = self.next_id.fetch_add(1, Ordering::SeqCst);
            let created = Task {
                id: TaskId::durable(format!("00000000-0000-4000-8000-{sequence:012}")),
                created_at: task.created_at + chrono::Duration::seconds(1),
                ..task.clone()
            };
            self.tasks.lock().expect("tasks mutex poisoned").push(created.clone());
            Ok(created)
        }

        async fn delete_task(&self, _session: &Session, id: &TaskId) -> Result<(), InfraError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.deleted.lock().expect("deleted mutex poisoned").push(id.clone());
            self.tasks
                .lock()
                .expect("tasks mutex poisoned")
                .retain(|task| &task.id != id);
            Ok(())
        }

        async fn bulk_replace(&self, _session: &Session, tasks: &[Task]) -> Result<(), InfraError> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.bulk_failure.lock().expect("failure mutex poisoned").take() {
                return Err(error);
            }
            *self.tasks.lock().expect("tasks mutex poisoned") = tasks.to_vec();
            Ok(())
        }

        async fn get_settings(&self, _session: &Session) -> Result<Option<Settings>, InfraError> {
            Ok(self.settings.lock().expect("settings mutex poisoned").clone())
        }

        async fn upsert_settings(&self, _session: &Session, settings: &Settings) -> Result<(), InfraError> {
            self.settings_calls.fetch_add(1, Ordering::SeqCst);
            *self.settings.lock().expect("settings mutex poisoned") = Some(settings.clone());
            Ok(())
        }
    }

    pub(crate) fn session() -> Session {
        Session {
            user_id: "user-1".to_string(),
            email: Some("me@example.com".to_string()),
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{session, FakeRemote};
    use super::*;
    use crate::domain::models::NewTask;
    use crate::domain::store::TaskStore;
    use crate::infrastructure::local_cache::InMemoryFallbackCache;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::Ordering;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn reconciler(
        remote: &Arc<FakeRemote>,
        cache: &Arc<InMemoryFallbackCache>,
    ) -> SyncReconciler<FakeRemote, InMemoryFallbackCache> {
        SyncReconciler::new(Arc::clone(remote), Arc::clone(cache)).with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        })
    }

    fn durable_task(store: &mut TaskStore, id: &str, title: &str) -> Task {
        let draft = NewTask {
            id: Some(TaskId::durable(id)),
            ..NewTask::titled(title)
        };
        store.add(draft, now()).expect("add task")
    }

    #[tokio::test]
    async fn provisional_ids_suppress_bulk_sync_but_still_mirror() {
        let remote = Arc::new(FakeRemote::default());
        let cache = Arc::new(InMemoryFallbackCache::default());
        let sync = reconciler(&remote, &cache);
        let mut store = TaskStore::default();
        durable_task(&mut store, "server-1", "synced");
        store.add(NewTask::titled("pending"), now()).expect("add");

        let outcome = sync
            .sync_tasks(Some(&session()), true, store.tasks())
            .await
            .expect("sync");
        assert_eq!(outcome, SyncOutcome::Suppressed { provisional: 1 });
        assert_eq!(remote.bulk_calls(), 0);
        assert_eq!(cache.load_tasks().expect("cache").map(|tasks| tasks.len()), Some(2));
    }

    #[tokio::test]
    async fn bulk_sync_requires_session_and_completed_load() {
        let remote = Arc::new(FakeRemote::default());
        let cache = Arc::new(InMemoryFallbackCache::default());
        let sync = reconciler(&remote, &cache);
        let mut store = TaskStore::default();
        durable_task(&mut store, "server-1", "synced");

        assert_eq!(
            sync.sync_tasks(None, true, store.tasks()).await.expect("signed out"),
            SyncOutcome::SignedOut
        );
        assert_eq!(
            sync.sync_tasks(Some(&session()), false, store.tasks()).await.expect("not loaded"),
            SyncOutcome::NotLoaded
        );
        assert_eq!(remote.bulk_calls(), 0);
        assert_eq!(
            sync.sync_tasks(Some(&session()), true, store.tasks()).await.expect("synced"),
            SyncOutcome::Synced
        );
        assert_eq!(remote.bulk_calls(), 1);
        assert_eq!(remote.stored_tasks(), store.tasks().to_vec());
    }

    #[tokio::test]
    async fn unauthorized_bulk_sync_is_reported_not_retried() {
        let remote = Arc::new(FakeRemote::default());
        *remote.bulk_failure.lock().expect("mutex") =
            Some(InfraError::Unauthorized("JWT expired".to_string()));
        let cache = Arc::new(InMemoryFallbackCache::default());
        let sync = reconciler(&remote, &cache);

        let result = sync.sync_tasks(Some(&session()), true, &[]).await;
        assert!(matches!(result, Err(ref error) if error.is_unauthorized()));
        assert_eq!(remote.bulk_calls(), 1);
    }

    #[tokio::test]
    async fn load_retries_transient_failures() {
        let remote = Arc::new(FakeRemote::default());
        let mut store = TaskStore::default();
        let task = durable_task(&mut store, "server-9", "remote task");
        remote.tasks.lock().expect("mutex").push(task.clone());
        {
            let mut failures = remote.list_failures.lock().expect("mutex");
            failures.push_back(InfraError::Network("timed out".to_string()));
            failures.push_back(InfraError::Network("connection reset".to_string()));
        }
        let cache = Arc::new(InMemoryFallbackCache::default());

        let loaded = reconciler(&remote, &cache).load(&session()).await.expect("load");
        assert_eq!(loaded.source, LoadSource::Remote);
        assert_eq!(loaded.tasks, vec![task.clone()]);
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.load_tasks().expect("cache"), Some(vec![task]));
    }

    #[tokio::test]
    async fn load_falls_back_to_cache_when_remote_is_down() {
        let remote = Arc::new(FakeRemote::default());
        {
            let mut failures = remote.list_failures.lock().expect("mutex");
            for _ in 0..3 {
                failures.push_back(InfraError::Network("offline".to_string()));
            }
        }
        let cache = Arc::new(InMemoryFallbackCache::default());
        let mut store = TaskStore::default();
        let cached = durable_task(&mut store, "server-2", "cached");
        cache.save_tasks(std::slice::from_ref(&cached)).expect("seed cache");

        let loaded = reconciler(&remote, &cache).load(&session()).await.expect("load");
        assert_eq!(loaded.source, LoadSource::Fallback);
        assert_eq!(loaded.tasks, vec![cached]);
        assert_eq!(loaded.settings, Settings::default());
    }

    #[tokio::test]
    async fn load_propagates_auth_rejection() {
        let remote = Arc::new(FakeRemote::default());
        remote
            .list_failures
            .lock()
            .expect("mutex")
            .push_back(InfraError::Unauthorized("expired".to_string()));
        let cache = Arc::new(InMemoryFallbackCache::default());

        let result = reconciler(&remote, &cache).load(&session()).await;
        assert!(matches!(result, Err(InfraError::Unauthorized(_))));
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn settings_sync_mirrors_and_upserts() {
        let remote = Arc::new(FakeRemote::default());
        let cache = Arc::new(InMemoryFallbackCache::default());
        let sync = reconciler(&remote, &cache);
        let mut settings = Settings::default();
        settings.set_daily_goal(7);

        let outcome = sync
            .sync_settings(Some(&session()), true, &settings)
            .await
            .expect("sync settings");
        assert_eq!(outcome, SyncOutcome::Synced);
        assert_eq!(remote.settings_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.load_settings().expect("cache"), Some(settings));
    }
}
