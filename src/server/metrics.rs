use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

const PREFIX: &str = "lizhi_player";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_http_requests_total"),
            "Total number of HTTP requests"
        ),
        &["method", "path", "status"]
    )
    .expect("Failed to create http_requests_total metric");

    // Mirror replication is fire-and-forget; these counters are the one
    // place its outcomes are observable.
    pub static ref MIRROR_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_mirror_jobs_total"),
            "Mirror replication jobs by kind and outcome"
        ),
        &["kind", "status"]
    )
    .expect("Failed to create mirror_jobs_total metric");

    pub static ref MIRROR_QUEUE_DROPS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_mirror_queue_drops_total"),
        "Mirror jobs dropped because the queue was full"
    )
    .expect("Failed to create mirror_queue_drops_total metric");
}

/// Register all metrics. Double registration (tests) is ignored.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MIRROR_JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MIRROR_QUEUE_DROPS_TOTAL.clone()));
}

pub fn render_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
