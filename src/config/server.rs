/// Mock store behavior configuration.
/// This models processing cost and instability of a real write endpoint.
#[derive(Debug, Clone, Copy, Default, clap::Args)]
pub struct MockBehavior {
    /// Base processing time before responding.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub base_latency: f64,

    /// Random delay added to base_latency.
    /// Models IO waits and backend variability.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub jitter: f64,

    /// Probability of rejecting a write with a server error.
    #[arg(long, default_value_t = 0.0)]
    pub error_rate: f64,
}
