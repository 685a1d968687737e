use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;

use crate::admission::enter;
use crate::error::AppError;
use crate::execution::{RunRequest, RunResult};
use crate::state::AppState;

/// Raw request body shape. `code` is required; everything else defaults.
/// Parsed by hand (rather than via axum's `Json` extractor) so a missing
/// `code` field and genuinely malformed JSON produce two distinct 400
/// messages.
#[derive(Debug, Deserialize)]
struct RunBody {
    code: Option<String>,
    input: Option<String>,
    #[serde(default)]
    compilers: Vec<String>,
    #[serde(default)]
    compile_args: Vec<String>,
    #[serde(default)]
    merge_output: bool,
}

/// `POST /run/{language}`: runs the submitted program and returns its
/// captured output.
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Path(language): Path<String>,
    body: Bytes,
) -> Response {
    match handle(state, language, body).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => err.into_response(),
    }
}

fn parse_body(body: &[u8]) -> Result<RunBody, AppError> {
    serde_json::from_slice(body).map_err(|_| AppError::bad_request("Bad json in body"))
}

/// Pairwise-zips `compilers`/`compile_args` into `"<compiler> <arg>"`
/// commands; unequal lengths truncate to the shorter.
fn zip_compile_commands(compilers: Vec<String>, compile_args: Vec<String>) -> Vec<String> {
    compilers
        .into_iter()
        .zip(compile_args)
        .map(|(compiler, arg)| format!("{compiler} {arg}"))
        .collect()
}

async fn handle(
    state: Arc<AppState>,
    language: String,
    body: Bytes,
) -> Result<RunResult, AppError> {
    let parsed = parse_body(&body)?;

    let code = parsed
        .code
        .ok_or_else(|| AppError::bad_request("Code is missing from body"))?;

    let compile_commands = zip_compile_commands(parsed.compilers, parsed.compile_args);

    let guard = enter(&state.admission).ok_or(AppError::CapacityExhausted)?;

    let request = RunRequest {
        language,
        code,
        input: parsed.input,
        compile_commands,
        merge_output: parsed.merge_output,
    };

    let result = state.execution.run(request).await;
    drop(guard);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_json() {
        let err = parse_body(b"not json").unwrap_err();
        assert_eq!(err.to_string(), "Bad json in body");
    }

    #[test]
    fn accepts_body_missing_optional_fields() {
        let parsed = parse_body(br#"{"code":"print(1)"}"#).unwrap();
        assert_eq!(parsed.code.as_deref(), Some("print(1)"));
        assert!(parsed.compilers.is_empty());
    }

    #[test]
    fn empty_string_code_is_present_not_missing() {
        let parsed = parse_body(br#"{"code":""}"#).unwrap();
        assert_eq!(parsed.code.as_deref(), Some(""));
    }

    #[test]
    fn compile_commands_truncate_to_shorter_list() {
        let compilers = vec!["gcc".to_string(), "g++".to_string()];
        let args = vec!["-O2".to_string()];
        let commands = zip_compile_commands(compilers, args);
        assert_eq!(commands, vec!["gcc -O2".to_string()]);
    }
}
