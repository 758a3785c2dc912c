use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_requests_total",
        "Total requests received on the ingestion endpoint"
    ))
    .expect("valid metric options");
    pub static ref REJECTED_REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_rejected_requests_total",
        "Requests rejected before touching the database"
    ))
    .expect("valid metric options");
    pub static ref READINGS_SAVED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_readings_saved_total",
        "Readings committed to the database"
    ))
    .expect("valid metric options");
    pub static ref NEW_DEVICES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_new_devices_total",
        "Devices registered on their first reading"
    ))
    .expect("valid metric options");
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_db_failures_total",
        "Total failed database statements"
    ))
    .expect("valid metric options");
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "ingestor_ingest_latency_seconds",
            "Time taken to store one reading, transaction included"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .expect("valid metric options");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REJECTED_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_SAVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NEW_DEVICES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DB_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INGEST_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
