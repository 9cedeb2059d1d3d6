//! Task Broker adapter contract (spec §4.7): the external collaborator that
//! actually executes a job's command and reports back on progress.
//!
//! This module defines the contract, plus an `HttpTaskBroker` implementation
//! for deployments that point `BROKER_URL` at a real queue-fronting HTTP
//! service (the worker pool itself stays out of scope, spec §1 — this is
//! only the adapter that talks to it). Tests wire in `InMemoryTaskBroker`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::job::Operator;
use crate::domain::task::TaskState;
use crate::error::{Result, SchedulerError};

/// Poll result for a single outstanding task handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatus {
    pub state: TaskState,
    /// Truncated by the caller to the shared 1000-char cap before persisting.
    pub result: Option<String>,
}

/// Dispatches and polls jobs against whatever queue backs command/SQL
/// execution. Implementations must be cheap to clone/share across tick
/// iterations (`Arc<dyn TaskBroker>` at the call site).
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Submit a `bash`/`sql` job for execution, returning a broker-assigned
    /// handle that the Scheduler Loop persists onto the `TaskInstance`
    /// (spec §4.4.1 step 6).
    async fn submit(
        &self,
        operator: Operator,
        command: &str,
        database: Option<&str>,
    ) -> Result<String>;

    /// Poll a previously submitted handle for its current state (spec §4.4.2
    /// step 1). Returns `TaskState::Pending` for handles the broker has not
    /// yet picked up.
    async fn poll(&self, task_handle: &str) -> Result<BrokerStatus>;
}

#[derive(Debug, Serialize)]
struct SubmitCommandRequest<'a> {
    command: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitSqlRequest<'a> {
    command: &'a str,
    database: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    handle: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    state: TaskState,
    result: Option<String>,
}

/// HTTP-backed `TaskBroker`, used when `BROKER_URL` is configured (spec §4.7,
/// §6 "Status values exchanged with broker"). Talks to a broker-fronting
/// service exposing `POST {base_url}/tasks/command`, `POST
/// {base_url}/tasks/sql`, and `GET {base_url}/tasks/{handle}` — the shapes a
/// real Celery-compatible or SQS-fronting queue service would sit behind.
///
/// Grounded on the teacher's `TavilyClient` (`kernel/tavily_client.rs`):
/// a `reqwest::Client` built once with a bounded timeout (spec §5 "Store/broker
/// calls must be bounded by configured timeouts, design defaults: 10s per call"),
/// held behind the adapter struct rather than rebuilt per call.
pub struct HttpTaskBroker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskBroker {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build broker HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl TaskBroker for HttpTaskBroker {
    async fn submit(
        &self,
        operator: Operator,
        command: &str,
        database: Option<&str>,
    ) -> Result<String> {
        let response = match operator {
            Operator::Bash => self
                .client
                .post(format!("{}/tasks/command", self.base_url))
                .json(&SubmitCommandRequest { command })
                .send()
                .await
                .map_err(|e| SchedulerError::Broker(e.to_string()))?,
            Operator::Sql => {
                let database = database.ok_or_else(|| {
                    SchedulerError::Broker("sql operator requires a database".to_string())
                })?;
                self.client
                    .post(format!("{}/tasks/sql", self.base_url))
                    .json(&SubmitSqlRequest { command, database })
                    .send()
                    .await
                    .map_err(|e| SchedulerError::Broker(e.to_string()))?
            }
            Operator::Python => {
                return Err(SchedulerError::Broker("unsupported operator: python".to_string()))
            }
        };

        let response = response
            .error_for_status()
            .map_err(|e| SchedulerError::Broker(e.to_string()))?
            .json::<SubmitResponse>()
            .await
            .map_err(|e| SchedulerError::Broker(e.to_string()))?;

        Ok(response.handle)
    }

    async fn poll(&self, task_handle: &str) -> Result<BrokerStatus> {
        let response = self
            .client
            .get(format!("{}/tasks/{task_handle}", self.base_url))
            .send()
            .await
            .map_err(|e| SchedulerError::Broker(e.to_string()))?
            .error_for_status()
            .map_err(|e| SchedulerError::Broker(e.to_string()))?
            .json::<PollResponse>()
            .await
            .map_err(|e| SchedulerError::Broker(e.to_string()))?;

        Ok(BrokerStatus {
            state: response.state,
            result: response.result,
        })
    }
}

/// Test double: every submission is accepted immediately and polling always
/// reports `Success`. Useful for exercising the Scheduler Loop's dispatch
/// side without a real queue.
pub struct NullTaskBroker;

#[async_trait]
impl TaskBroker for NullTaskBroker {
    async fn submit(
        &self,
        _operator: Operator,
        _command: &str,
        _database: Option<&str>,
    ) -> Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn poll(&self, _task_handle: &str) -> Result<BrokerStatus> {
        Ok(BrokerStatus {
            state: TaskState::Success,
            result: Some("1".to_string()),
        })
    }
}

/// Test double that lets a test script the exact state sequence a handle
/// returns, for exercising reconcile-pass transitions deterministically.
pub struct InMemoryTaskBroker {
    statuses: std::sync::Mutex<std::collections::HashMap<String, BrokerStatus>>,
}

impl InMemoryTaskBroker {
    pub fn new() -> Self {
        Self {
            statuses: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Pre-seed (or overwrite) the status a future `poll` call will return
    /// for `task_handle`.
    pub fn set_status(&self, task_handle: &str, status: BrokerStatus) {
        self.statuses
            .lock()
            .expect("InMemoryTaskBroker mutex poisoned")
            .insert(task_handle.to_string(), status);
    }
}

impl Default for InMemoryTaskBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskBroker for InMemoryTaskBroker {
    async fn submit(
        &self,
        _operator: Operator,
        _command: &str,
        _database: Option<&str>,
    ) -> Result<String> {
        let handle = uuid::Uuid::new_v4().to_string();
        self.set_status(
            &handle,
            BrokerStatus {
                state: TaskState::Pending,
                result: None,
            },
        );
        Ok(handle)
    }

    async fn poll(&self, task_handle: &str) -> Result<BrokerStatus> {
        Ok(self
            .statuses
            .lock()
            .expect("InMemoryTaskBroker mutex poisoned")
            .get(task_handle)
            .cloned()
            .unwrap_or(BrokerStatus {
                state: TaskState::Pending,
                result: None,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_broker_submits_and_resolves_immediately() {
        let broker = NullTaskBroker;
        let handle = broker.submit(Operator::Bash, "echo hi", None).await.unwrap();
        let status = broker.poll(&handle).await.unwrap();
        assert_eq!(status.state, TaskState::Success);
    }

    #[tokio::test]
    async fn in_memory_broker_reports_seeded_status() {
        let broker = InMemoryTaskBroker::new();
        let handle = broker.submit(Operator::Bash, "echo hi", None).await.unwrap();
        assert_eq!(broker.poll(&handle).await.unwrap().state, TaskState::Pending);

        broker.set_status(
            &handle,
            BrokerStatus {
                state: TaskState::Success,
                result: Some("1 ok".to_string()),
            },
        );
        let status = broker.poll(&handle).await.unwrap();
        assert_eq!(status.state, TaskState::Success);
        assert_eq!(status.result.as_deref(), Some("1 ok"));
    }
}
