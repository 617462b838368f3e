//! Interactive driver for one sandboxed interpreter session.
//!
//! Reads fragments from stdin (terminated by a blank line), executes each in
//! the session, and prints the captured output and value. Exists to exercise
//! the full provision/frame/execute/teardown path end to end.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;
use tracing_subscriber::EnvFilter;

use replbox::{
    BusyPolicy, DockerProvisioner, LocalProvisioner, ResourceLimits, RuntimeProvisioner,
    RuntimeSpec, Session, SessionConfig,
};

/// Replbox - run code fragments in a persistent sandboxed interpreter
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Container image with the interpreter installed
    #[arg(long, default_value = "python:3.12-slim")]
    image: String,

    /// Interactive interpreter command inside the runtime
    #[arg(long, default_value = "python3 -i -q -u")]
    interpreter: String,

    /// Run the interpreter directly on the host instead of in a container
    #[arg(long)]
    local: bool,

    /// Per-call timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Memory limit for the container, e.g. "512m"
    #[arg(long)]
    memory: Option<String>,

    /// CPU quota for the container, e.g. 1.5
    #[arg(long)]
    cpus: Option<f64>,

    /// Allow network access inside the container
    #[arg(long)]
    network: bool,

    /// Host directory mounted at /workspace inside the runtime
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Print each call result as one JSON object instead of plain text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = SessionConfig {
        call_timeout_seconds: cli.timeout,
        busy: BusyPolicy::Queue,
        ..SessionConfig::default()
    };
    let spec = RuntimeSpec {
        image: cli.image,
        interpreter: cli.interpreter,
        limits: ResourceLimits {
            memory: cli.memory,
            cpus: cli.cpus,
            pids: None,
        },
        network: cli.network,
        workspace: cli.workspace,
    };

    let provisioner: Arc<dyn RuntimeProvisioner> = if cli.local {
        Arc::new(LocalProvisioner::new())
    } else {
        Arc::new(DockerProvisioner::new())
    };

    let session = Session::start(config, spec, provisioner).await?;
    eprintln!(
        "session {} ready. Enter a fragment, finish with a blank line, Ctrl-D to quit.",
        session.id()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut fragment = String::new();

    loop {
        let line = lines.next_line().await?;
        let at_eof = line.is_none();

        if let Some(line) = line {
            if !line.trim().is_empty() {
                fragment.push_str(&line);
                fragment.push('\n');
                continue;
            }
        }

        if !fragment.trim().is_empty() {
            run_fragment(&session, &fragment, cli.json).await?;
            fragment.clear();
        }
        if at_eof {
            break;
        }
    }

    session.close().await?;
    Ok(())
}

async fn run_fragment(session: &Session, fragment: &str, json: bool) -> Result<()> {
    match session.execute(fragment).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string(&result)?);
            } else {
                if !result.output.is_empty() {
                    println!("{}", result.output);
                }
                if let Some(value) = &result.value {
                    println!("=> {value}");
                }
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            if session.state().is_terminal() {
                anyhow::bail!("session is no longer usable: {e}");
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
