//! Runs one program inside one container, start to finish, and shapes the
//! result the HTTP edge returns.

use std::sync::Arc;

use hyper::Method;
use scopeguard::guard;
use serde::Serialize;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AppConfiguration;
use crate::engine::types::{attach_query, delete_query, InspectContainerResponse, RunSpec};
use crate::engine::timing::compute_exec_time;
use crate::engine::{EngineClient, EngineResponse};
use crate::error::AppError;

/// Input to one run, assembled by the HTTP edge from the request body.
pub struct RunRequest {
    pub language: String,
    pub code: String,
    pub input: Option<String>,
    pub compile_commands: Vec<String>,
    pub merge_output: bool,
}

/// Result shape returned to the HTTP edge, serialized verbatim as the
/// response body.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub exec_time: f64,
}

/// Sentinel exit code used when the engine never reported one (e.g. the
/// container was killed before `docker inspect` could observe an exit).
const EXIT_CODE_UNKNOWN: i64 = -1;

pub struct ExecutionEngine {
    engine: EngineClient,
    app_config: Arc<AppConfiguration>,
}

impl ExecutionEngine {
    pub fn new(engine: EngineClient, app_config: Arc<AppConfiguration>) -> Self {
        Self { engine, app_config }
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunResult, AppError> {
        let span = info_span!("run", language = %request.language, run_id = %Uuid::new_v4());
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: RunRequest) -> Result<RunResult, AppError> {
        let env = build_env(&request, self.app_config.exec_timeout_seconds);

        let max_ram_bytes = self.app_config.max_ram_bytes()?;
        let spec = RunSpec {
            image: format!("{}-{}", self.app_config.image_prefix, request.language),
            env,
            stop_timeout: self.app_config.container_stop_timeout_seconds(),
            max_ram_bytes,
            max_cpu_fraction: self.app_config.max_container_cpu,
        };

        let create_body = serde_json::to_value(spec.into_body())?;

        let created = self
            .engine
            .call(Method::POST, "containers/create", &Default::default(), Some(create_body), false)
            .await?;
        let container_id = expect_json(created)?
            .get("Id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::engine("POST", "containers/create", "response had no Id"))?
            .to_string();

        // From here on the container must always be removed, whatever
        // happens next. The delete is awaited directly below so it has
        // actually been dispatched (and, barring engine failure, completed)
        // before this function returns; the scopeguard underneath only
        // catches a panic or early task cancellation unwinding through this
        // scope, since a dropped future never reaches the `await` below.
        let engine = self.engine.clone();
        let id_for_panic_cleanup = container_id.clone();
        let panic_guard = guard((), move |_| {
            let engine = engine.clone();
            let id = id_for_panic_cleanup.clone();
            tokio::spawn(async move {
                if let Err(e) = engine
                    .call(Method::DELETE, &format!("containers/{id}"), &delete_query(), None, false)
                    .await
                {
                    warn!(error = %e, container_id = %id, "failed to remove container during unwind cleanup");
                }
            });
        });

        let result = self.run_with_container(&container_id).await;

        if let Err(e) = self
            .engine
            .call(
                Method::DELETE,
                &format!("containers/{container_id}"),
                &delete_query(),
                None,
                false,
            )
            .await
        {
            warn!(error = %e, container_id = %container_id, "failed to remove container during cleanup");
        }

        scopeguard::ScopeGuard::into_inner(panic_guard);
        result
    }

    async fn run_with_container(&self, container_id: &str) -> Result<RunResult, AppError> {
        self.engine
            .call(
                Method::POST,
                &format!("containers/{container_id}/start"),
                &Default::default(),
                None,
                false,
            )
            .await?;

        let query = attach_query();
        let attach = self
            .engine
            .call(
                Method::POST,
                &format!("containers/{container_id}/attach"),
                &query,
                None,
                true,
            )
            .await?;
        let (stdout, stderr) = match attach {
            EngineResponse::Stream { stdout, stderr } => (stdout, stderr),
            EngineResponse::Json(_) => (Vec::new(), Vec::new()),
        };

        let inspected = self
            .engine
            .call(
                Method::GET,
                &format!("containers/{container_id}/json"),
                &Default::default(),
                None,
                false,
            )
            .await?;
        let inspected: InspectContainerResponse = match inspected {
            EngineResponse::Json(v) => serde_json::from_value(v)?,
            EngineResponse::Stream { .. } => unreachable!("inspect is never called in stream mode"),
        };

        let exit_code = inspected.state.exit_code.unwrap_or(EXIT_CODE_UNKNOWN);
        let exec_time = compute_exec_time(&inspected.state.started_at, &inspected.state.finished_at)
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not compute exec_time, reporting sentinel");
                -1.0
            });

        Ok(RunResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            exec_time,
        })
    }
}

fn expect_json(response: EngineResponse) -> Result<serde_json::Value, AppError> {
    match response {
        EngineResponse::Json(v) => Ok(v),
        EngineResponse::Stream { .. } => unreachable!("create is never called in stream mode"),
    }
}

/// Builds the container's `Env` list from the run request.
fn build_env(request: &RunRequest, exec_timeout_seconds: u64) -> Vec<String> {
    let mut env = vec![
        format!("CODE={}", request.code),
        format!("TIMEOUT={exec_timeout_seconds}"),
    ];

    if !request.compile_commands.is_empty() {
        env.push(format!(
            "COMPILE_COMMAND={}",
            request.compile_commands.join(" && ")
        ));
    }

    if let Some(input) = &request.input {
        if !input.is_empty() {
            let with_newline = if input.ends_with('\n') {
                input.clone()
            } else {
                format!("{input}\n")
            };
            env.push(format!("INPUT={with_newline}"));
        }
    }

    if request.merge_output {
        env.push("MERGE_OUTPUT=1".to_string());
    }

    env
}
