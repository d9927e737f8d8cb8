use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;

pub mod cmd;
pub mod config;
pub mod core;
pub mod points;
pub mod sink;
pub mod stats;
pub mod telemetry;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// CLI arguments for configuring tsbench behavior.
#[derive(Debug, Clone, Parser)]
#[command(name = "tsbench")]
#[command(bin_name = "tsbench")]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    cmds: CliCommands,

    /// debug logging as default instead of info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false, global = true)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o', global = true)]
    pub output: Option<PathBuf>,

    /// number of runtime worker threads (defaults to the number of CPUs)
    #[arg(long, value_name = "N", global = true)]
    pub workers: Option<usize>,

    /// the graceful shutdown timeout in seconds (<= 0.0 = no timeout)
    #[arg(long, value_name = "SECONDS", default_value_t = 0., global = true)]
    pub graceful: f64,
}

#[derive(Debug, Clone, Subcommand)]
enum CliCommands {
    Run(cmd::run::RunCommand),
    Mock(cmd::mock::MockCommand),
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = args.workers {
        builder.worker_threads(workers.max(1));
    }
    let runtime = builder.build().context("build tokio runtime")?;

    runtime.block_on(async {
        telemetry::init_tracing(telemetry::TelemetryConfig {
            verbose: args.verbose,
            pretty: args.pretty,
            output: args.output.as_deref(),
        })?;

        if let Err(err) = run_with_args(tokio_graceful::default_signal(), args).await {
            eprintln!("exit with error: {err:#}");
            std::process::exit(1);
        }
        Ok(())
    })
}

/// run a tsbench cmd with the given args
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> anyhow::Result<()>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    let graceful_timeout = (args.graceful > 0.).then(|| Duration::from_secs_f64(args.graceful));

    let (error_tx, error_rx) = tokio::sync::oneshot::channel::<()>();
    let graceful =
        tokio_graceful::Shutdown::new(new_shutdown_signal(error_rx, base_shutdown_signal));

    // The command error itself is kept aside so it survives the shutdown
    // sequence and decides the exit status.
    let failure: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

    graceful.spawn_task_fn({
        let failure = failure.clone();
        move |guard| async move {
            let result = match args.cmds {
                CliCommands::Run(run_args) => cmd::run::exec(guard, run_args).await,
                CliCommands::Mock(mock_args) => cmd::mock::exec(guard, mock_args).await,
            };
            if let Err(err) = result {
                *failure.lock() = Some(err);
                let _ = error_tx.send(());
            }
        }
    });

    let delay = match graceful_timeout {
        Some(duration) => graceful
            .shutdown_with_limit(duration)
            .await
            .context("graceful shutdown with timeout")?,
        None => graceful.shutdown().await,
    };
    tracing::debug!("gracefully shutdown with a delay of: {delay:?}");

    match failure.lock().take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn new_shutdown_signal(
    error_rx: tokio::sync::oneshot::Receiver<()>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        tokio::select! {
            _ = base_shutdown_signal => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            result = error_rx => {
                match result {
                    Ok(()) => {
                        tracing::error!("fatal command error received: init graceful shutdown");
                    }
                    Err(_) => {
                        tracing::debug!("command is finished without error, return control");
                    }
                }
            }
        }
    }
}
