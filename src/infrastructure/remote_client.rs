use crate::domain::models::{Session, Settings, Task, TaskId};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_row::{SettingsRow, TaskRow};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use url::Url;

const TASKS_TABLE: &str = "tasks";
const SETTINGS_TABLE: &str = "settings";

#[async_trait]
pub trait RemoteTaskStore: Send + Sync {
    async fn list_tasks(&self, session: &Session) -> Result<Vec<Task>, InfraError>;

    async fn create_task(&self, session: &Session, task: &Task) -> Result<Task, InfraError>;

    async fn delete_task(&self, session: &Session, id: &TaskId) -> Result<(), InfraError>;

    async fn bulk_replace(&self, session: &Session, tasks: &[Task]) -> Result<(), InfraError>;

    async fn get_settings(&self, session: &Session) -> Result<Option<Settings>, InfraError>;

    async fn upsert_settings(&self, session: &Session, settings: &Settings) -> Result<(), InfraError>;
}

pub(crate) fn http_error(context: &str, status: StatusCode, body: &str) -> InfraError {
    let detail = if body.trim().is_empty() {
        format!("{context}: http {}", status.as_u16())
    } else {
        format!("{context}: http {}; body={body}", status.as_u16())
    };
    let lowered = body.to_ascii_lowercase();
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lowered.contains("jwt expired")
        || lowered.contains("invalid jwt")
    {
        InfraError::Unauthorized(detail)
    } else {
        InfraError::Remote(detail)
    }
}

pub(crate) fn network_error(context: &str, error: reqwest::Error) -> InfraError {
    InfraError::Network(format!("network error while {context}: {error}"))
}

#[derive(Debug, Clone)]
pub struct SupabaseRestClient {
    client: Client,
    base_url: Url,
    anon_key: String,
}

impl SupabaseRestClient {
    pub fn new(base_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            anon_key: anon_key.into(),
        }
    }

    fn table_endpoint(&self, table: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("remote url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("rest");
            segments.push("v1");
            segments.push(table);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, session: &Session) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| network_error(context, error))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| network_error(context, error))?;
        if !status.is_success() {
            return Err(http_error(context, status, &body));
        }
        Ok(body)
    }

    fn parse_rows(body: &str, context: &str) -> Result<Vec<TaskRow>, InfraError> {
        serde_json::from_str(body)
            .map_err(|error| InfraError::Remote(format!("invalid {context} payload: {error}; body={body}")))
    }

    fn durable_id<'a>(id: &'a TaskId) -> Result<&'a str, InfraError> {
        match id {
            TaskId::Durable(id) => Ok(id),
            TaskId::Provisional(_) => Err(InfraError::Validation(format!(
                "task {id} has no durable id yet"
            ))),
        }
    }
}

fn in_list(ids: &[&str]) -> String {
    let quoted = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("({quoted})")
}

#[async_trait]
impl RemoteTaskStore for SupabaseRestClient {
    async fn list_tasks(&self, session: &Session) -> Result<Vec<Task>, InfraError> {
        let mut url = self.table_endpoint(TASKS_TABLE)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("user_id", &format!("eq.{}", session.user_id))
            .append_pair("order", "order_index.asc");

        let body = self
            .send(self.request(Method::GET, url, session), "listing tasks")
            .await?;
        Self::parse_rows(&body, "task list")?
            .into_iter()
            .map(TaskRow::into_task)
            .collect()
    }

    async fn create_task(&self, session: &Session, task: &Task) -> Result<Task, InfraError> {
        let url = self.table_endpoint(TASKS_TABLE)?;
        let row = TaskRow::for_insert(task, &session.user_id);
        let request = self
            .request(Method::POST, url, session)
            .header("Prefer", "return=representation")
            .json(&row);

        let body = self.send(request, "creating task").await?;
        Self::parse_rows(&body, "task create")?
            .into_iter()
            .next()
            .ok_or_else(|| InfraError::Remote("task create response was empty".to_string()))?
            .into_task()
    }

    async fn delete_task(&self, session: &Session, id: &TaskId) -> Result<(), InfraError> {
        let id = Self::durable_id(id)?;
        let mut url = self.table_endpoint(TASKS_TABLE)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{id}"))
            .append_pair("user_id", &format!("eq.{}", session.user_id));

        self.send(self.request(Method::DELETE, url, session), "deleting task")
            .await?;
        Ok(())
    }

    async fn bulk_replace(&self, session: &Session, tasks: &[Task]) -> Result<(), InfraError> {
        let rows = tasks
            .iter()
            .map(|task| TaskRow::for_upsert(task, &session.user_id))
            .collect::<Result<Vec<_>, _>>()?;

        if !rows.is_empty() {
            let mut url = self.table_endpoint(TASKS_TABLE)?;
            url.query_pairs_mut().append_pair("on_conflict", "id");
            let request = self
                .request(Method::POST, url, session)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&rows);
            self.send(request, "upserting tasks").await?;
        }

        let kept = rows
            .iter()
            .filter_map(|row| row.id.as_deref())
            .collect::<Vec<_>>();
        let mut url = self.table_endpoint(TASKS_TABLE)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("user_id", &format!("eq.{}", session.user_id));
            if !kept.is_empty() {
                query.append_pair("id", &format!("not.in.{}", in_list(&kept)));
            }
        }
        self.send(self.request(Method::DELETE, url, session), "pruning tasks")
            .await?;
        Ok(())
    }

    async fn get_settings(&self, session: &Session) -> Result<Option<Settings>, InfraError> {
        let mut url = self.table_endpoint(SETTINGS_TABLE)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("user_id", &format!("eq.{}", session.user_id))
            .append_pair("limit", "1");

        let body = self
            .send(self.request(Method::GET, url, session), "loading settings")
            .await?;
        let rows: Vec<SettingsRow> = serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid settings payload: {error}; body={body}"))
        })?;
        Ok(rows.into_iter().next().map(SettingsRow::into_settings))
    }

    async fn upsert_settings(&self, session: &Session, settings: &Settings) -> Result<(), InfraError> {
        let mut url = self.table_endpoint(SETTINGS_TABLE)?;
        url.query_pairs_mut().append_pair("on_conflict", "user_id");
        let request = self
            .request(Method::POST, url, session)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&SettingsRow::from_settings(settings, &session.user_id));
        self.send(request, "saving settings").await?;
        Ok(())
    }
}

/// Stand-in used when no remote project is configured. Every call fails
/// with `InvalidConfig`, which callers treat like being offline.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredRemote {
    reason: String,
}

impl UnconfiguredRemote {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub(crate) fn error(&self) -> InfraError {
        InfraError::InvalidConfig(format!("remote persistence is not configured: {}", self.reason))
    }
}

#[async_trait]
impl RemoteTaskStore for UnconfiguredRemote {
    async fn list_tasks(&self, _session: &Session) -> Result<Vec<Task>, InfraError> {
        Err(self.error())
    }

    async fn create_task(&self, _session: &Session, _task: &Task) -> Result<Task, InfraError> {
        Err(self.error())
    }

    async fn delete_task(&self, _session: &Session, _id: &TaskId) -> Result<(), InfraError> {
        Err(self.error())
    }

    async fn bulk_replace(&self, _session: &Session, _tasks: &[Task]) -> Result<(), InfraError> {
        Err(self.error())
    }

    async fn get_settings(&self, _session: &Session) -> Result<Option<Settings>, InfraError> {
        Err(self.error())
    }

    async fn upsert_settings(&self, _session: &Session, _settings: &Settings) -> Result<(), InfraError> {
        Err(self.error())
    }
}
