//! Subscribes to the `run-api` pub/sub channel and acts on two commands:
//! pull a fresh image for a language, or terminate this process so a
//! supervisor respawns it.

use futures_util::StreamExt;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::RedisRpcConfiguration;
use crate::engine::EngineClient;

const CHANNEL: &str = "run-api";

const COMMAND_UPDATE_RUNNERS: u8 = 0;
const COMMAND_UPDATE_LANGUAGE: u8 = 1;

#[derive(Debug, Deserialize)]
struct Command {
    opcode: u8,
    #[serde(default)]
    language: Option<String>,
}

/// Spawns the listener as its own task and returns its handle so the caller
/// can abort it during shutdown.
pub fn spawn(config: RedisRpcConfiguration, engine: EngineClient, image_prefix: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run(config, engine, image_prefix).await {
            error!(error = %e, "control-plane listener exited");
        }
    })
}

async fn run(
    config: RedisRpcConfiguration,
    engine: EngineClient,
    image_prefix: String,
) -> redis::RedisResult<()> {
    let client = redis::Client::open(config.url())?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(CHANNEL).await?;
    info!(channel = CHANNEL, "control-plane listener subscribed");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dropping control-plane message with unreadable payload");
                continue;
            }
        };

        let command: Command = match serde_json::from_str(&payload) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, %payload, "dropping malformed control-plane message");
                continue;
            }
        };

        dispatch(command, &engine, &image_prefix).await;
    }

    Ok(())
}

async fn dispatch(command: Command, engine: &EngineClient, image_prefix: &str) {
    match command.opcode {
        COMMAND_UPDATE_RUNNERS => {
            info!("received UPDATE_RUNNERS, terminating process for supervisor respawn");
            let pid = Pid::this();
            if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
                error!(error = %e, "failed to signal self for restart");
            }
        }
        COMMAND_UPDATE_LANGUAGE => {
            let Some(language) = command.language else {
                warn!("UPDATE_LANGUAGE message missing a language field");
                return;
            };
            let image = format!("{image_prefix}-{language}");
            let engine = engine.clone();
            tokio::spawn(async move {
                info!(%image, "pulling fresh image");
                if let Err(e) = engine.pull_image(&image).await {
                    error!(error = %e, %image, "image pull failed");
                }
            });
        }
        other => {
            warn!(opcode = other, "unknown control-plane opcode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_update_runners_command() {
        let command: Command = serde_json::from_str(r#"{"opcode":0}"#).unwrap();
        assert_eq!(command.opcode, COMMAND_UPDATE_RUNNERS);
        assert!(command.language.is_none());
    }

    #[test]
    fn decodes_update_language_command() {
        let command: Command =
            serde_json::from_str(r#"{"opcode":1,"language":"python"}"#).unwrap();
        assert_eq!(command.opcode, COMMAND_UPDATE_LANGUAGE);
        assert_eq!(command.language.as_deref(), Some("python"));
    }
}
