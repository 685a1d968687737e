//! Wire types for the container engine's REST API.
//!
//! These mirror the subset of the Docker Engine API this service touches,
//! deliberately not the whole schema, since the Engine Client only ever
//! issues a handful of calls against it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CPU_QUOTA: i64 = 100_000;

#[derive(Debug, Clone, Serialize)]
pub struct HostConfig {
    #[serde(rename = "Memory")]
    pub memory: i64,
    #[serde(rename = "MemorySwap")]
    pub memory_swap: i64,
    #[serde(rename = "CpuQuota")]
    pub cpu_quota: i64,
    #[serde(rename = "CpuPeriod")]
    pub cpu_period: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    #[serde(rename = "Test")]
    pub test: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateContainerBody {
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Env")]
    pub env: Vec<String>,
    #[serde(rename = "StopTimeout")]
    pub stop_timeout: u64,
    #[serde(rename = "WorkingDir")]
    pub working_dir: String,
    #[serde(rename = "AutoRemove")]
    pub auto_remove: bool,
    #[serde(rename = "NetworkMode")]
    pub network_mode: String,
    #[serde(rename = "NetworkDisabled")]
    pub network_disabled: bool,
    #[serde(rename = "HealthCheck")]
    pub health_check: HealthCheck,
    #[serde(rename = "HostConfig")]
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContainerResponse {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Warnings", default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InspectContainerResponse {
    #[serde(rename = "State")]
    pub state: ContainerState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "ExitCode")]
    pub exit_code: Option<i64>,
    #[serde(rename = "StartedAt")]
    pub started_at: String,
    #[serde(rename = "FinishedAt")]
    pub finished_at: String,
}

/// Generic envelope for responses we only care about the `Warnings` field
/// of: warnings are logged but do not fail the call.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WarningsEnvelope {
    #[serde(rename = "Warnings", default)]
    pub warnings: Vec<String>,
}

/// Parameters used to build the `Env` list and the container's `Image`.
pub struct RunSpec {
    pub image: String,
    pub env: Vec<String>,
    pub stop_timeout: u64,
    pub max_ram_bytes: i64,
    pub max_cpu_fraction: f64,
}

impl RunSpec {
    pub fn into_body(self) -> CreateContainerBody {
        let cpu_period = (self.max_cpu_fraction * CPU_QUOTA as f64).round() as i64;

        CreateContainerBody {
            image: self.image,
            env: self.env,
            stop_timeout: self.stop_timeout,
            working_dir: "/sandbox".to_string(),
            auto_remove: false,
            network_mode: "none".to_string(),
            network_disabled: true,
            health_check: HealthCheck {
                test: vec!["NONE".to_string()],
            },
            host_config: HostConfig {
                memory: self.max_ram_bytes,
                memory_swap: self.max_ram_bytes,
                cpu_quota: CPU_QUOTA,
                cpu_period,
            },
        }
    }
}

pub fn attach_query() -> HashMap<&'static str, &'static str> {
    [
        ("logs", "1"),
        ("stream", "1"),
        ("stdin", "1"),
        ("stdout", "1"),
        ("stderr", "1"),
    ]
    .into_iter()
    .collect()
}

pub fn delete_query() -> HashMap<&'static str, &'static str> {
    [("v", "1"), ("force", "1")].into_iter().collect()
}
