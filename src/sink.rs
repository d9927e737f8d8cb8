use async_trait::async_trait;

use crate::points::{self, Point};

/// Failure of a single batch write.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for point batches.
///
/// Implementations perform one network write per call and are shared
/// read-only across attempts; per-call state stays on the stack.
#[async_trait]
pub trait WriteSink: Send + Sync + 'static {
    async fn write(
        &self,
        points: &[Point],
        database: &str,
        retention_policy: &str,
    ) -> Result<(), WriteError>;
}

/// Writes batches to an InfluxDB-compatible HTTP endpoint using the
/// line protocol (`POST /write`).
#[derive(Debug, Clone)]
pub struct HttpWriteSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWriteSink {
    pub fn new(host: &str, port: u16) -> Result<Self, WriteError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: format!("http://{host}:{port}"),
        })
    }

    /// Startup reachability probe. An unreachable target is a fatal
    /// configuration error, surfaced before the run begins.
    pub async fn ping(&self) -> Result<(), WriteError> {
        self.client
            .get(format!("{}/ping", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl WriteSink for HttpWriteSink {
    async fn write(
        &self,
        points: &[Point],
        database: &str,
        retention_policy: &str,
    ) -> Result<(), WriteError> {
        let body = points::encode_lines(points);

        let response = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[
                ("db", database),
                ("rp", retention_policy),
                ("precision", "ns"),
            ])
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WriteError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
