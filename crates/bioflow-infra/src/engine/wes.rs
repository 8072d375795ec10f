//! WesEngineClient -- [`EngineClient`] over the GA4GH Workflow Execution Service API.
//!
//! Runs are started with a multipart `POST /ga4gh/wes/v1/runs` carrying the
//! workflow files as `workflow_attachment` parts. Reads and cancels retry
//! connection failures, timeouts and 5xx responses with exponential backoff.
//! Starting a run only retries connection failures, since the engine may have
//! accepted a request that timed out or failed server-side.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use bioflow_core::engine::EngineClient;
use bioflow_types::config::EngineConfig;
use bioflow_types::engine::{EngineRunState, EngineTaskLog, RunLog, RunWorkflowRequest};
use bioflow_types::error::EngineError;

const API_PREFIX: &str = "/ga4gh/wes/v1";

/// First retry waits this long; each further retry doubles it.
const BACKOFF_BASE: Duration = Duration::from_millis(250);

pub struct WesEngineClient {
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
}

impl WesEngineClient {
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Other(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// Build the full API URL for a path under the WES prefix.
    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    /// Send the request produced by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt since multipart bodies are consumed
    /// by `send`.
    async fn dispatch<F>(
        &self,
        operation: &str,
        idempotent: bool,
        build: F,
    ) -> Result<reqwest::Response, EngineError>
    where
        F: Fn() -> Result<reqwest::RequestBuilder, EngineError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match build()?.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    let err = status_error(status, &body);
                    if !should_retry(Failure::Status(status), idempotent) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => {
                    let failure = if e.is_connect() {
                        Failure::Connect
                    } else if e.is_timeout() {
                        Failure::Timeout
                    } else {
                        Failure::Other
                    };
                    let err = EngineError::Other(format!("HTTP request failed: {e}"));
                    if !should_retry(failure, idempotent) {
                        return Err(err);
                    }
                    err
                }
            };

            if attempt >= self.max_attempts {
                return Err(err);
            }
            let delay = backoff(attempt);
            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "engine request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl EngineClient for WesEngineClient {
    async fn run_workflow(&self, request: &RunWorkflowRequest) -> Result<String, EngineError> {
        let url = self.url("/runs");
        let response = self
            .dispatch("run_workflow", false, || Ok(self.client.post(&url).multipart(build_form(request)?)))
            .await?;

        let body: RunIdResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Other(format!("failed to parse run id: {e}")))?;
        tracing::debug!(engine_run_id = %body.run_id, workflow_url = %request.workflow_url, "engine run started");
        Ok(body.run_id)
    }

    async fn get_run_log(&self, engine_run_id: &str) -> Result<RunLog, EngineError> {
        let url = self.url(&format!("/runs/{engine_run_id}"));
        let response = self.dispatch("get_run_log", true, || Ok(self.client.get(&url))).await?;
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Other(format!("failed to read run log: {e}")))?;
        parse_run_log(&body)
    }

    async fn cancel_run(&self, engine_run_id: &str) -> Result<(), EngineError> {
        let url = self.url(&format!("/runs/{engine_run_id}/cancel"));
        self.dispatch("cancel_run", true, || Ok(self.client.post(&url))).await?;
        Ok(())
    }
}

fn is_transient_status(status: u16) -> bool {
    (500..600).contains(&status)
}

/// How one attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Status(u16),
    Connect,
    Timeout,
    Other,
}

/// A request that never connected is always safe to resend.
fn should_retry(failure: Failure, idempotent: bool) -> bool {
    match failure {
        Failure::Connect => true,
        Failure::Timeout => idempotent,
        Failure::Status(status) => idempotent && is_transient_status(status),
        Failure::Other => false,
    }
}

fn backoff(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Map a non-success response to an [`EngineError`].
fn status_error(status: u16, body: &str) -> EngineError {
    let message = error_message(body);
    match status {
        404 => EngineError::NotFound(message),
        400 => EngineError::BadRequest(message),
        _ => EngineError::Other(format!("HTTP {status}: {message}")),
    }
}

/// WES error bodies are `{"msg": ..., "status_code": ...}`; fall back to the raw text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorResponse {
        msg: String,
    }

    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.msg)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn build_form(request: &RunWorkflowRequest) -> Result<Form, EngineError> {
    let engine_params = if request.workflow_engine_parameters.is_null() {
        serde_json::json!({})
    } else {
        request.workflow_engine_parameters.clone()
    };

    let mut form = Form::new()
        .text("workflow_type", request.workflow_type.clone())
        .text("workflow_type_version", request.workflow_type_version.clone())
        .text("workflow_url", request.workflow_url.clone())
        .text("workflow_params", encode("workflow_params", &request.workflow_params)?)
        .text("workflow_engine_parameters", encode("workflow_engine_parameters", &engine_params)?)
        .text("tags", encode("tags", &request.tags)?);

    for file in &request.attachments {
        form = form.part(
            "workflow_attachment",
            Part::text(file.content.clone()).file_name(file.path.clone()),
        );
    }
    Ok(form)
}

fn encode<T: serde::Serialize>(field: &str, value: &T) -> Result<String, EngineError> {
    serde_json::to_string(value).map_err(|e| EngineError::BadRequest(format!("cannot encode {field}: {e}")))
}

#[derive(Deserialize)]
struct RunIdResponse {
    run_id: String,
}

// -- WES run log wire format --

#[derive(Deserialize)]
struct WesRunLog {
    run_id: String,
    state: EngineRunState,
    #[serde(default)]
    outputs: serde_json::Value,
    #[serde(default)]
    task_logs: Option<Vec<WesLog>>,
    #[serde(default)]
    run_log: Option<WesLog>,
}

#[derive(Deserialize)]
struct WesLog {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
}

fn parse_run_log(body: &str) -> Result<RunLog, EngineError> {
    let wire: WesRunLog =
        serde_json::from_str(body).map_err(|e| EngineError::Other(format!("failed to parse run log: {e}")))?;

    let task_logs = wire
        .task_logs
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, task)| EngineTaskLog {
            name: task.name.unwrap_or_else(|| format!("task-{i}")),
            exit_code: task.exit_code,
            stdout: task.stdout.unwrap_or_default(),
            stderr: task.stderr.unwrap_or_default(),
        })
        .collect();

    let (log, message) = match wire.run_log {
        Some(run_log) => (
            run_log.stdout.filter(|s| !s.is_empty()),
            run_log.stderr.filter(|s| !s.is_empty()),
        ),
        None => (None, None),
    };

    Ok(RunLog {
        run_id: wire.run_id,
        state: wire.state,
        outputs: wire.outputs,
        task_logs,
        log,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use bioflow_types::workflow::WorkflowFile;

    fn make_client(base_url: &str) -> WesEngineClient {
        WesEngineClient::from_config(&EngineConfig {
            base_url: base_url.to_string(),
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let client = make_client("http://wes:8000/");
        assert_eq!(client.url("/runs"), "http://wes:8000/ga4gh/wes/v1/runs");
        assert_eq!(client.url("/runs/abc/cancel"), "http://wes:8000/ga4gh/wes/v1/runs/abc/cancel");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(404, r#"{"msg":"run not found","status_code":404}"#),
            EngineError::NotFound("run not found".into())
        );
        assert_eq!(
            status_error(400, "bad params"),
            EngineError::BadRequest("bad params".into())
        );
        assert!(matches!(status_error(503, ""), EngineError::Other(_)));
        assert!(is_transient_status(502));
        assert!(!is_transient_status(400));
        assert!(!is_transient_status(404));
    }

    #[test]
    fn test_run_submission_only_retries_connect_failures() {
        assert!(should_retry(Failure::Connect, false));
        assert!(!should_retry(Failure::Timeout, false));
        assert!(!should_retry(Failure::Status(503), false));

        assert!(should_retry(Failure::Timeout, true));
        assert!(should_retry(Failure::Status(503), true));
        assert!(!should_retry(Failure::Status(404), true));
        assert!(!should_retry(Failure::Other, true));
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(250));
        assert_eq!(backoff(2), Duration::from_millis(500));
        assert_eq!(backoff(3), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_run_log_maps_wire_format() {
        let body = r#"{
            "run_id": "r-1",
            "state": "EXECUTOR_ERROR",
            "outputs": {"wf.bam": "/out/s1.bam"},
            "run_log": {"name": "wf", "stdout": "/logs/wf.out", "stderr": "task align failed"},
            "task_logs": [
                {"name": "wf.align", "exit_code": 1, "stderr": "/logs/align.err"},
                {"exit_code": 0}
            ]
        }"#;

        let log = parse_run_log(body).unwrap();
        assert_eq!(log.run_id, "r-1");
        assert!(log.state.is_error());
        assert_eq!(log.outputs["wf.bam"], "/out/s1.bam");
        assert_eq!(log.log.as_deref(), Some("/logs/wf.out"));
        assert_eq!(log.message.as_deref(), Some("task align failed"));
        assert_eq!(log.task_logs.len(), 2);
        assert_eq!(log.task_logs[0].name, "wf.align");
        assert_eq!(log.task_logs[0].exit_code, Some(1));
        assert_eq!(log.task_logs[1].name, "task-1");
        assert!(log.task_logs[1].stdout.is_empty());
    }

    #[test]
    fn test_parse_run_log_minimal() {
        let log = parse_run_log(r#"{"run_id":"r-2","state":"QUEUED","task_logs":null}"#).unwrap();
        assert_eq!(log.state, EngineRunState::Queued);
        assert!(log.task_logs.is_empty());
        assert!(log.log.is_none());
        assert!(parse_run_log("not json").is_err());
    }

    #[test]
    fn test_build_form_accepts_request() {
        let request = RunWorkflowRequest {
            workflow_type: "WDL".into(),
            workflow_type_version: "1.0".into(),
            workflow_url: "main.wdl".into(),
            attachments: vec![WorkflowFile {
                path: "main.wdl".into(),
                content: "workflow wf {}".into(),
            }],
            workflow_params: serde_json::json!({"wf.reads": "s1.fq"}),
            workflow_engine_parameters: serde_json::Value::Null,
            tags: BTreeMap::from([("run_id".to_string(), "r-1".to_string())]),
        };
        let form = build_form(&request).unwrap();
        assert!(!form.boundary().is_empty());
    }
}
