use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};

/// Tag value pools the synthetic workload draws from.
///
/// Deliberately small so the generated series cardinality stays bounded and
/// repeated runs hit the same series.
const HOSTS: &[&str] = &["host1", "host2", "host3", "host4", "host5", "host6"];

const METRICS: &[&str] = &[
    "com.addthis.Service.total._red_pjson__.1MinuteRate",
    "com.addthis.Service.total._red_lojson_100eng.json.1MinuteRate",
    "com.addthis.Service.total._red_lojson_300lo.json.1MinuteRate",
];

/// One synthetic data point, timestamped with nanosecond precision.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp_ns: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
}

impl Point {
    /// Appends this point as one line-protocol line (without trailing newline).
    pub fn encode_into(&self, out: &mut String) {
        escape_into(&self.measurement, out, &[',', ' ']);
        for (key, value) in &self.tags {
            out.push(',');
            escape_into(key, out, &[',', '=', ' ']);
            out.push('=');
            escape_into(value, out, &[',', '=', ' ']);
        }

        out.push(' ');
        let mut first = true;
        for (key, value) in &self.fields {
            if !first {
                out.push(',');
            }
            first = false;
            escape_into(key, out, &[',', '=', ' ']);
            out.push('=');
            value.encode_into(out);
        }

        out.push(' ');
        out.push_str(&self.timestamp_ns.to_string());
    }
}

impl FieldValue {
    fn encode_into(&self, out: &mut String) {
        match self {
            Self::Float(v) => out.push_str(&v.to_string()),
            Self::Integer(v) => {
                out.push_str(&v.to_string());
                out.push('i');
            }
            Self::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Self::Text(v) => {
                out.push('"');
                for c in v.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
        }
    }
}

fn escape_into(raw: &str, out: &mut String, special: &[char]) {
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Joins a batch into one newline-separated line-protocol body.
pub fn encode_lines(points: &[Point]) -> String {
    let mut out = String::new();
    for point in points {
        point.encode_into(&mut out);
        out.push('\n');
    }
    out
}

/// Synthesizes randomized point batches for one measurement.
///
/// Tag values are drawn from the fixed pools above, the `value` field is a
/// random float and the whole batch shares the timestamp of the call. The
/// producer is shared across attempts behind a lock so tests can inject a
/// seeded generator for reproducible batch contents.
#[derive(Debug)]
pub struct BatchProducer {
    measurement: String,
    rng: Mutex<SmallRng>,
}

impl BatchProducer {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self::new_with_rng(measurement, SmallRng::from_os_rng())
    }

    pub fn new_with_rng(measurement: impl Into<String>, rng: SmallRng) -> Self {
        Self {
            measurement: measurement.into(),
            rng: Mutex::new(rng),
        }
    }

    pub fn produce_batch(&self, count: usize) -> Vec<Point> {
        let timestamp_ns = unix_timestamp_ns();
        let mut rng = self.rng.lock();

        (0..count)
            .map(|_| {
                let tags = BTreeMap::from([
                    (
                        "host".to_owned(),
                        HOSTS[rng.random_range(0..HOSTS.len())].to_owned(),
                    ),
                    (
                        "metric".to_owned(),
                        METRICS[rng.random_range(0..METRICS.len())].to_owned(),
                    ),
                ]);
                let fields =
                    BTreeMap::from([("value".to_owned(), FieldValue::Float(rng.random::<f64>()))]);

                Point {
                    measurement: self.measurement.clone(),
                    tags,
                    fields,
                    timestamp_ns,
                }
            })
            .collect()
    }
}

fn unix_timestamp_ns() -> i64 {
    // A wall clock before the unix epoch is not worth handling here.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as i64)
}
