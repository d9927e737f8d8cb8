use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Args;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_graceful::ShutdownGuard;

use crate::config::RunConfig;
use crate::core::{RateScheduler, RunOutcome};
use crate::points::BatchProducer;
use crate::sink::HttpWriteSink;
use crate::stats::{RunStats, StatsSnapshot};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Args)]
/// drive write load against a time-series store
pub struct RunCommand {
    /// target host
    #[arg(long, short = 'H', default_value = "localhost")]
    host: String,

    /// target port
    #[arg(long, short = 'p', default_value_t = 8086)]
    port: u16,

    /// database to write into
    #[arg(long = "db", value_name = "NAME", default_value = "load_test")]
    database: String,

    /// measurement to write points under
    #[arg(long, short = 'm', default_value = "load_test")]
    measurement: String,

    /// retention policy the writes are bound to
    #[arg(long = "rp", value_name = "NAME", default_value = "default")]
    retention_policy: String,

    /// points per write request
    #[arg(long, value_name = "N", default_value_t = 5000)]
    batch_size: usize,

    /// write requests issued per second
    #[arg(long, value_name = "N", default_value_t = 5)]
    rate: u32,

    /// time in seconds for the run
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    duration: u32,

    /// maximum number of in-flight write requests
    #[arg(long, value_name = "N", default_value_t = 50)]
    concurrency: usize,

    /// report the final summary as JSON instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl RunCommand {
    fn into_config(self) -> (RunConfig, bool) {
        let config = RunConfig {
            host: self.host,
            port: self.port,
            database: self.database,
            measurement: self.measurement,
            retention_policy: self.retention_policy,
            batch_size: self.batch_size,
            rate: self.rate,
            duration_secs: self.duration,
            concurrency: self.concurrency,
        };
        (config, self.json)
    }
}

pub async fn exec(guard: ShutdownGuard, args: RunCommand) -> anyhow::Result<()> {
    let (config, json) = args.into_config();
    config.validate().context("invalid run configuration")?;

    let sink = HttpWriteSink::new(&config.host, config.port).context("create write client")?;
    // An unreachable target is a configuration error: fail before the run starts.
    sink.ping()
        .await
        .with_context(|| format!("ping http://{}:{}", config.host, config.port))?;

    let stats = Arc::new(RunStats::new());
    guard.spawn_task_fn({
        let stats = stats.clone();
        move |guard| report_worker(guard, stats, REPORT_INTERVAL)
    });

    tracing::info!(
        rate = config.rate,
        duration_secs = config.duration_secs,
        batch_size = config.batch_size,
        concurrency = config.concurrency,
        database = %config.database,
        measurement = %config.measurement,
        "starting load run",
    );

    let producer = Arc::new(BatchProducer::new(&config.measurement));
    let concurrency = config.concurrency;
    let scheduler = RateScheduler::new(config, producer, Arc::new(sink), stats.clone());

    let started = Instant::now();
    let outcome = scheduler.run(guard.clone_weak().into_cancelled()).await;
    let elapsed = started.elapsed();

    print_summary(&outcome, &stats.snapshot(), elapsed, json);

    if outcome.overloaded {
        // Distinct non-zero exit so operators can tell a shed run from a
        // clean finish.
        anyhow::bail!("run cut short: concurrency ceiling ({concurrency}) reached");
    }
    Ok(())
}

/// Logs an aggregate snapshot once per interval while the run is active.
async fn report_worker(guard: ShutdownGuard, stats: Arc<RunStats>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; skip it so every report covers a
    // full interval.
    ticker.tick().await;

    let mut last_total = 0u64;
    loop {
        tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!("exit report worker: guard shutdown");
                return;
            }
            _ = ticker.tick() => {}
        }

        let snap = stats.snapshot();
        let interval_rps = (snap.total - last_total) as f64 / interval.as_secs_f64();
        last_total = snap.total;

        tracing::info!(
            rps = interval_rps,
            ok = snap.ok,
            errors = snap.errors,
            p50_us = snap.p50_us,
            p95_us = snap.p95_us,
            p99_us = snap.p99_us,
            "interval report",
        );
    }
}

fn print_summary(outcome: &RunOutcome, snap: &StatsSnapshot, elapsed: Duration, json: bool) {
    if json {
        let line = serde_json::json!({
            "type": "final",
            "launched": outcome.launched,
            "overloaded": outcome.overloaded,
            "interrupted": outcome.interrupted,
            "elapsed_ms": elapsed.as_millis() as u64,
            "stats": snap,
        });
        println!("{line}");
        return;
    }

    println!(
        "done launched={} ok={} errors={} overloaded={} elapsed={:.1}s p50={}us p95={}us p99={}us max={}us",
        outcome.launched,
        snap.ok,
        snap.errors,
        outcome.overloaded,
        elapsed.as_secs_f64(),
        snap.p50_us,
        snap.p95_us,
        snap.p99_us,
        snap.max_us,
    );
}
