use clap::Parser;

/// Process arguments: a config file path, an optional bind-address override,
/// and verbosity flags layered on top of `RUST_LOG`.
#[derive(Parser, Debug)]
#[command(name = "run-api", version, about = "Sandboxed code execution backend")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "RUN_API_CONFIG", default_value = "config.toml")]
    pub config: String,

    /// Overrides the address the HTTP edge binds to.
    #[arg(long, env = "RUN_API_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// Increases log verbosity; repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Default `tracing` filter directive implied by `-v`/`-vv` when
    /// `RUST_LOG` is not set.
    pub fn default_log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
