use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use clap::Args;
use parking_lot::Mutex;
use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};
use tokio_graceful::ShutdownGuard;

use crate::config::MockBehavior;

#[derive(Debug, Clone, Args)]
/// serve a mock store write endpoint
pub struct MockCommand {
    /// socket address to bind to
    #[arg(long, short = 'b', value_name = "ADDRESS", default_value = "127.0.0.1:8086")]
    bind: SocketAddr,

    #[clap(flatten)]
    behavior: MockBehavior,
}

struct MockState {
    behavior: MockBehavior,
    rng: Mutex<SmallRng>,
    requests: AtomicU64,
    points: AtomicU64,
}

impl MockState {
    fn new(behavior: MockBehavior, rng: SmallRng) -> Self {
        Self {
            behavior,
            rng: Mutex::new(rng),
            requests: AtomicU64::new(0),
            points: AtomicU64::new(0),
        }
    }

    /// Computed up front so no lock is held across the sleep.
    fn delay(&self) -> Duration {
        let base = self.behavior.base_latency.max(0.0);
        let jitter = self.behavior.jitter.max(0.0);

        let extra = if jitter > 0.0 {
            self.rng.lock().random_range(0.0..jitter)
        } else {
            0.0
        };

        Duration::from_secs_f64(base + extra)
    }

    fn roll_error(&self) -> bool {
        let rate = self.behavior.error_rate.clamp(0.0, 1.0);
        rate > 0.0 && self.rng.lock().random_bool(rate)
    }
}

pub async fn exec(guard: ShutdownGuard, args: MockCommand) -> anyhow::Result<()> {
    let state = Arc::new(MockState::new(args.behavior, SmallRng::from_os_rng()));
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("bind mock store to {}", args.bind))?;
    let local_addr = listener.local_addr().context("get bound address")?;
    tracing::info!(
        %local_addr,
        base_latency = args.behavior.base_latency,
        jitter = args.behavior.jitter,
        error_rate = args.behavior.error_rate,
        "mock store listening",
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(guard.clone_weak().into_cancelled())
        .await
        .context("serve mock store")?;

    tracing::info!(
        requests = state.requests.load(Ordering::Acquire),
        points = state.points.load(Ordering::Acquire),
        "mock store stopped",
    );
    Ok(())
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/write", post(write))
        .with_state(state)
}

async fn ping() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn write(State(state): State<Arc<MockState>>, body: String) -> StatusCode {
    let delay = state.delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let lines = body.lines().filter(|line| !line.trim().is_empty()).count() as u64;
    state.requests.fetch_add(1, Ordering::AcqRel);
    state.points.fetch_add(lines, Ordering::AcqRel);

    if state.roll_error() {
        tracing::debug!("injected write failure");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt as _;

    fn seeded_state(behavior: MockBehavior) -> Arc<MockState> {
        Arc::new(MockState::new(behavior, SmallRng::seed_from_u64(1)))
    }

    #[tokio::test]
    async fn ping_responds_no_content() {
        let app = router(seeded_state(MockBehavior::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn write_counts_requests_and_points() {
        let state = seeded_state(MockBehavior::default());
        let app = router(state.clone());

        let body = "m,host=host1 value=0.5 1\nm,host=host2 value=0.7 2\n";
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/write?db=load_test&rp=default&precision=ns")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.requests.load(Ordering::Acquire), 1);
        assert_eq!(state.points.load(Ordering::Acquire), 2);
    }

    #[tokio::test]
    async fn full_error_rate_rejects_every_write() {
        let state = seeded_state(MockBehavior {
            error_rate: 1.0,
            ..MockBehavior::default()
        });
        let app = router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/write")
                    .body(Body::from("m value=1 1\n"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The write is still counted; rejection models a server-side failure
        // after receipt.
        assert_eq!(state.requests.load(Ordering::Acquire), 1);
    }
}
