//! Thin request/response layer over the container engine's HTTP API,
//! transported on a local Unix socket.
//!
//! This is deliberately not a full client for the engine's API surface: it
//! knows how to send a JSON request and parse a JSON response, and how to
//! decode the attach multiplex framing. Everything else, what path to call,
//! what body to send, what the response means, is the Execution Engine's job.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use hyperlocal::{UnixConnector, Uri as UnixUri};
use serde_json::Value;
use tracing::warn;

use crate::engine::multiplex::FrameAccumulator;
use crate::engine::types::WarningsEnvelope;
use crate::error::AppError;

/// Response shape for [`EngineClient::call`]'s single
/// `call(method, path, query, body, stream?) -> response` operation.
pub enum EngineResponse {
    Json(Value),
    Stream { stdout: Vec<u8>, stderr: Vec<u8> },
}

#[derive(Clone)]
pub struct EngineClient {
    http: Client<UnixConnector, Full<Bytes>>,
    socket_path: PathBuf,
    api_version: String,
    exec_timeout: Duration,
    output_byte_cap: usize,
}

impl EngineClient {
    pub fn new(
        socket_path: impl AsRef<Path>,
        api_version: impl Into<String>,
        exec_timeout: Duration,
        output_byte_cap: usize,
    ) -> Self {
        let http = Client::builder(TokioExecutor::new()).build(UnixConnector);

        Self {
            http,
            socket_path: socket_path.as_ref().to_path_buf(),
            api_version: api_version.into(),
            exec_timeout,
            output_byte_cap,
        }
    }

    fn build_uri(&self, path: &str, query: &HashMap<&str, &str>) -> hyper::Uri {
        let mut full_path = format!("/{}/{}", self.api_version.trim_matches('/'), path);
        if !query.is_empty() {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            full_path.push('?');
            full_path.push_str(&qs);
        }
        UnixUri::new(&self.socket_path, &full_path).into()
    }

    /// The one public operation this client exposes. `stream = true` is used
    /// only for container attach; every other call is a plain JSON
    /// request/response.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        query: &HashMap<&str, &str>,
        body: Option<Value>,
        stream: bool,
    ) -> Result<EngineResponse, AppError> {
        let uri = self.build_uri(path, query);

        let body_bytes = match &body {
            Some(v) => serde_json::to_vec(v)?,
            None => Vec::new(),
        };

        let mut builder = Request::builder().method(method.clone()).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body_bytes)))
            .map_err(|e| AppError::engine(method.as_str(), path, e.to_string()))?;

        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| AppError::engine(method.as_str(), path, e.to_string()))?;

        let status = response.status();

        if stream {
            return self.read_stream(method, path, status, response).await;
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| AppError::engine(method.as_str(), path, e.to_string()))?
            .to_bytes();

        self.finish_json(method, path, status, &body)
    }

    fn finish_json(
        &self,
        method: Method,
        path: &str,
        status: StatusCode,
        body: &[u8],
    ) -> Result<EngineResponse, AppError> {
        if !(status.is_success() || status.is_redirection()) {
            let detail = match serde_json::from_slice::<Value>(body) {
                Ok(v) => v.to_string(),
                Err(_) => "<unparseable engine response>".to_string(),
            };
            return Err(AppError::engine_status(
                method.as_str(),
                path,
                status.as_u16(),
                detail,
            ));
        }

        if status == StatusCode::NO_CONTENT || body.is_empty() {
            return Ok(EngineResponse::Json(Value::Object(Default::default())));
        }

        let value: Value = serde_json::from_slice(body)?;

        if let Ok(envelope) = serde_json::from_value::<WarningsEnvelope>(value.clone()) {
            for w in envelope.warnings {
                warn!(warning = %w, %method, %path, "engine returned a warning");
            }
        }

        Ok(EngineResponse::Json(value))
    }

    /// Reads the attach response body as a multiplexed stream, decoding
    /// frames as they arrive and stopping at end-of-stream or the
    /// `exec_timeout_seconds` safety cap, whichever comes first. A mid-stream
    /// error or timeout yields whatever was accumulated instead of failing
    /// the call, since the caller still inspects and destroys the container
    /// afterwards.
    async fn read_stream(
        &self,
        method: Method,
        path: &str,
        status: StatusCode,
        response: Response<Incoming>,
    ) -> Result<EngineResponse, AppError> {
        if !(status.is_success() || status.is_redirection()) {
            let body = response
                .into_body()
                .collect()
                .await
                .map(|c| c.to_bytes())
                .unwrap_or_default();
            let detail = serde_json::from_slice::<Value>(&body)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "<unparseable engine response>".to_string());
            return Err(AppError::engine_status(
                method.as_str(),
                path,
                status.as_u16(),
                detail,
            ));
        }

        let mut acc = FrameAccumulator::new(self.output_byte_cap);
        let mut body = response.into_body();

        let read_all = async {
            let mut carry: Vec<u8> = Vec::new();
            loop {
                match body.frame().await {
                    Some(Ok(frame)) => {
                        if let Ok(data) = frame.into_data() {
                            carry.extend_from_slice(&data);
                            let tail_len = acc.feed(&carry).len();
                            let consumed = carry.len() - tail_len;
                            carry.drain(0..consumed);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, %path, "attach stream ended with an error, keeping partial output");
                        break;
                    }
                    None => break,
                }
            }
        };

        // A coarse safety cap independent of the image's own TIMEOUT
        // enforcement: if the engine never closes the stream, we stop
        // waiting after `exec_timeout` and return whatever was captured so
        // far.
        if tokio::time::timeout(self.exec_timeout, read_all).await.is_err() {
            warn!(%path, "attach stream hit the safety timeout, returning partial output");
        }

        if acc.truncated() {
            warn!(%path, cap = self.output_byte_cap, "attach output truncated at byte cap");
        }

        let (stdout, stderr) = acc.into_parts();
        Ok(EngineResponse::Stream { stdout, stderr })
    }

    /// Convenience used by the control-plane's `UPDATE_LANGUAGE` handler:
    /// `POST images/create?fromImage=<image>`.
    pub async fn pull_image(&self, image: &str) -> Result<(), AppError> {
        let query: HashMap<&str, &str> = [("fromImage", image)].into_iter().collect();
        self.call(Method::POST, "images/create", &query, None, false)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    /// Accepts one connection on `socket_path`, reads (and discards) the
    /// request, then writes back a fixed HTTP/1.1 response. Good enough to
    /// exercise the real `hyper` + `hyperlocal` transport without a live
    /// container engine.
    async fn respond_once(socket_path: PathBuf, status_line: &'static str, body: Vec<u8>) {
        let listener = UnixListener::bind(&socket_path).expect("bind mock engine socket");
        let (mut stream, _) = listener.accept().await.expect("accept mock connection");

        let mut buf = [0u8; 8192];
        let _ = stream.read(&mut buf).await;

        let header = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(header.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();
        stream.shutdown().await.ok();
    }

    fn test_client() -> EngineClient {
        EngineClient::new("/tmp/unused.sock", "v1.41", Duration::from_secs(5), 1024)
    }

    #[test]
    fn finish_json_passes_through_success_with_warnings() {
        let client = test_client();
        let body = br#"{"Id":"abc123","Warnings":["low disk space"]}"#;
        let response = client
            .finish_json(Method::POST, "containers/create", StatusCode::CREATED, body)
            .expect("2xx with a Warnings field must still succeed");

        match response {
            EngineResponse::Json(v) => assert_eq!(v["Id"], "abc123"),
            EngineResponse::Stream { .. } => panic!("expected a json response"),
        }
    }

    #[test]
    fn finish_json_treats_204_as_empty_object() {
        let client = test_client();
        let response = client
            .finish_json(Method::DELETE, "containers/abc", StatusCode::NO_CONTENT, b"")
            .unwrap();

        match response {
            EngineResponse::Json(v) => assert_eq!(v, Value::Object(Default::default())),
            EngineResponse::Stream { .. } => panic!("expected a json response"),
        }
    }

    #[tokio::test]
    async fn create_with_a_missing_image_surfaces_as_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("engine.sock");

        let server = tokio::spawn(respond_once(
            socket_path.clone(),
            "404 Not Found",
            br#"{"message":"No such image: run-unknown"}"#.to_vec(),
        ));

        let client = EngineClient::new(&socket_path, "v1.41", Duration::from_secs(5), 1024);
        let err = client
            .call(Method::POST, "containers/create", &Default::default(), None, false)
            .await
            .expect_err("engine 404 must surface as an error");

        match err {
            AppError::EngineError { status, path, .. } => {
                assert_eq!(status, Some(404));
                assert_eq!(path, "containers/create");
            }
            other => panic!("expected EngineError, got {other:?}"),
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn attach_stream_decodes_frames_over_the_real_transport() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("engine.sock");

        let mut body = Vec::new();
        body.extend(b"\x01\x00\x00\x00\x00\x00\x00\x05");
        body.extend(b"hello");
        body.extend(b"\x02\x00\x00\x00\x00\x00\x00\x03");
        body.extend(b"err");

        let server = tokio::spawn(respond_once(socket_path.clone(), "200 OK", body));

        let client = EngineClient::new(&socket_path, "v1.41", Duration::from_secs(5), 1024 * 1024);
        let response = client
            .call(
                Method::POST,
                "containers/abc/attach",
                &Default::default(),
                None,
                true,
            )
            .await
            .expect("attach call should succeed");

        match response {
            EngineResponse::Stream { stdout, stderr } => {
                assert_eq!(stdout, b"hello");
                assert_eq!(stderr, b"err");
            }
            EngineResponse::Json(_) => panic!("expected a stream response"),
        }

        server.await.unwrap();
    }
}
