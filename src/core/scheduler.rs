use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::RunConfig;
use crate::core::limiter::{ConcurrencyLimiter, InFlightSlot};
use crate::core::tracker::CompletionTracker;
use crate::points::BatchProducer;
use crate::sink::WriteSink;
use crate::stats::StatsSink;

/// Outcome of one scheduling run, returned after every launched attempt has
/// finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Attempts admitted and launched over the whole run.
    pub launched: u64,
    /// The concurrency ceiling was hit and the remainder of the schedule was
    /// shed.
    pub overloaded: bool,
    /// The shutdown signal fired before the schedule completed.
    pub interrupted: bool,
}

/// Converts a requests-per-second target into launched write attempts.
///
/// Intent
/// The scheduler ticks once per wall-clock second and launches `rate`
/// attempts per tick, each admitted by the concurrency limiter. Admission
/// refusal is terminal: the tick counter is forced to the end of the schedule
/// and no further work is launched, while everything already admitted runs to
/// completion. Attempts never feed errors back into the control path; the
/// only signals the loop reacts to are the ticker, admission refusal and
/// shutdown.
pub struct RateScheduler {
    config: RunConfig,
    limiter: ConcurrencyLimiter,
    tracker: CompletionTracker,
    producer: Arc<BatchProducer>,
    sink: Arc<dyn WriteSink>,
    stats: Arc<dyn StatsSink>,
}

impl RateScheduler {
    pub fn new(
        config: RunConfig,
        producer: Arc<BatchProducer>,
        sink: Arc<dyn WriteSink>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            limiter: ConcurrencyLimiter::new(config.concurrency),
            tracker: CompletionTracker::new(),
            config,
            producer,
            sink,
            stats,
        }
    }

    /// Number of attempts currently holding a limiter slot.
    pub fn in_flight(&self) -> usize {
        self.limiter.in_flight()
    }

    /// Drives the tick loop and drains outstanding attempts before returning.
    ///
    /// `shutdown` resolving stops the launch of new attempts; like the end of
    /// the schedule it never cancels work that is already in flight.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> RunOutcome {
        let mut shutdown = std::pin::pin!(shutdown);

        let period = Duration::from_secs(1);
        // The first tick fires after one full period, matching the
        // one-second scheduling quantum.
        let mut ticker = time::interval_at(Instant::now() + period, period);
        // A stalled runtime must not replay missed ticks as a burst.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let duration = u64::from(self.config.duration_secs);
        let mut ticks = 0u64;
        let mut launched = 0u64;
        let mut overloaded = false;
        let mut interrupted = false;

        while ticks < duration {
            tokio::select! {
                _ = shutdown.as_mut() => {
                    tracing::info!(ticks, launched, "shutdown signal: stop launching new attempts");
                    interrupted = true;
                    break;
                }
                _ = ticker.tick() => {}
            }

            for _ in 0..self.config.rate {
                let Some(slot) = self.limiter.try_acquire() else {
                    // Shedding instead of queueing keeps memory and open
                    // sockets bounded under sustained overload.
                    tracing::warn!(
                        ceiling = self.limiter.ceiling(),
                        tick = ticks,
                        launched,
                        "concurrency ceiling reached: shedding the remainder of the run",
                    );
                    overloaded = true;
                    break;
                };

                self.launch_attempt(slot);
                launched += 1;
            }

            ticks += 1;
            if overloaded {
                // Terminal overload: jump the counter to the end of the
                // schedule so no further tick launches work.
                ticks = duration;
            }
        }

        tracing::debug!(
            launched,
            outstanding = self.tracker.outstanding(),
            "schedule complete: waiting for outstanding attempts",
        );
        self.tracker.await_empty().await;

        RunOutcome {
            launched,
            overloaded,
            interrupted,
        }
    }

    fn launch_attempt(&self, slot: InFlightSlot) {
        let outstanding = self.tracker.track();
        let producer = self.producer.clone();
        let sink = self.sink.clone();
        let stats = self.stats.clone();
        let batch_size = self.config.batch_size;
        let database = self.config.database.clone();
        let retention_policy = self.config.retention_policy.clone();

        tokio::spawn(async move {
            // Both guards drop on every exit path, panics included.
            let _slot = slot;
            let _outstanding = outstanding;

            let started = Instant::now();
            let points = producer.produce_batch(batch_size);
            match sink.write(&points, &database, &retention_policy).await {
                Ok(()) => stats.record_latency(started.elapsed()),
                Err(err) => {
                    stats.record_error();
                    tracing::warn!(error = %err, "write attempt failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::pending;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use rand::{SeedableRng as _, rngs::SmallRng};
    use tokio::sync::Semaphore;
    use tokio::task::yield_now;

    use crate::points::Point;
    use crate::sink::WriteError;
    use crate::stats::RunStats;

    struct OkSink;

    #[async_trait]
    impl WriteSink for OkSink {
        async fn write(&self, _: &[Point], _: &str, _: &str) -> Result<(), WriteError> {
            Ok(())
        }
    }

    struct FailSink;

    #[async_trait]
    impl WriteSink for FailSink {
        async fn write(&self, _: &[Point], _: &str, _: &str) -> Result<(), WriteError> {
            Err(WriteError::Rejected {
                status: 500,
                body: "boom".to_owned(),
            })
        }
    }

    /// Holds every write until the test hands out permits.
    struct GatedSink {
        gate: Arc<Semaphore>,
        started: AtomicU64,
    }

    #[async_trait]
    impl WriteSink for GatedSink {
        async fn write(&self, _: &[Point], _: &str, _: &str) -> Result<(), WriteError> {
            self.started.fetch_add(1, Ordering::AcqRel);
            let _permit = self.gate.acquire().await;
            Ok(())
        }
    }

    fn config(rate: u32, duration_secs: u32, concurrency: usize) -> RunConfig {
        RunConfig {
            host: "localhost".to_owned(),
            port: 8086,
            database: "load_test".to_owned(),
            measurement: "load_test".to_owned(),
            retention_policy: "default".to_owned(),
            batch_size: 10,
            rate,
            duration_secs,
            concurrency,
        }
    }

    fn scheduler(
        config: RunConfig,
        sink: Arc<dyn WriteSink>,
    ) -> (Arc<RateScheduler>, Arc<RunStats>) {
        let producer = Arc::new(BatchProducer::new_with_rng(
            config.measurement.clone(),
            SmallRng::seed_from_u64(7),
        ));
        let stats = Arc::new(RunStats::new());
        let scheduler = Arc::new(RateScheduler::new(config, producer, sink, stats.clone()));
        (scheduler, stats)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn launches_rate_times_duration_attempts() {
        let (scheduler, stats) = scheduler(config(5, 3, 50), Arc::new(OkSink));

        let outcome = scheduler.run(pending()).await;

        assert_eq!(
            outcome,
            RunOutcome {
                launched: 15,
                overloaded: false,
                interrupted: false,
            }
        );

        let snap = stats.snapshot();
        assert_eq!(snap.ok, 15);
        assert_eq!(snap.errors, 0);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn write_failures_are_counted_and_never_abort_the_run() {
        let (scheduler, stats) = scheduler(config(5, 3, 50), Arc::new(FailSink));

        let outcome = scheduler.run(pending()).await;

        assert_eq!(outcome.launched, 15);
        assert!(!outcome.overloaded);

        let snap = stats.snapshot();
        assert_eq!(snap.ok, 0);
        assert_eq!(snap.errors, 15);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn overload_sheds_the_schedule_but_drains_admitted_attempts() {
        let gate = Arc::new(Semaphore::new(0));
        let sink = Arc::new(GatedSink {
            gate: gate.clone(),
            started: AtomicU64::new(0),
        });
        let (scheduler, stats) = scheduler(config(100, 30, 10), sink.clone());

        let run = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(pending()).await }
        });

        // Let the run task register its ticker before advancing the clock.
        for _ in 0..4 {
            yield_now().await;
        }

        // First tick fires at t+1s; every admitted attempt then parks on the
        // gate, so the eleventh admission within the tick is refused.
        time::advance(Duration::from_secs(1)).await;
        for _ in 0..16 {
            yield_now().await;
        }

        assert_eq!(sink.started.load(Ordering::Acquire), 10);
        assert_eq!(scheduler.in_flight(), 10);
        assert!(!run.is_finished());

        // Let the admitted attempts finish; the run must then drain even
        // though 29 scheduled ticks never happened.
        gate.add_permits(100);
        let outcome = run.await.expect("run join");

        assert_eq!(
            outcome,
            RunOutcome {
                launched: 10,
                overloaded: true,
                interrupted: false,
            }
        );
        assert_eq!(stats.snapshot().ok, 10);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn zero_duration_exits_immediately_without_launching() {
        let (scheduler, stats) = scheduler(config(5, 0, 50), Arc::new(OkSink));

        let outcome = scheduler.run(pending()).await;

        assert_eq!(outcome.launched, 0);
        assert!(!outcome.overloaded);
        assert_eq!(stats.snapshot().total, 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn zero_rate_still_ticks_through_the_schedule() {
        let (scheduler, stats) = scheduler(config(0, 3, 50), Arc::new(OkSink));

        let started = Instant::now();
        let outcome = scheduler.run(pending()).await;

        assert_eq!(outcome.launched, 0);
        assert_eq!(stats.snapshot().total, 0);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn shutdown_stops_launching_and_drains() {
        let (scheduler, stats) = scheduler(config(1, 10, 50), Arc::new(OkSink));

        // Fires between the first and second tick.
        let outcome = scheduler
            .run(async {
                time::sleep(Duration::from_millis(1_500)).await;
            })
            .await;

        assert_eq!(
            outcome,
            RunOutcome {
                launched: 1,
                overloaded: false,
                interrupted: true,
            }
        );
        assert_eq!(stats.snapshot().ok, 1);
    }
}
