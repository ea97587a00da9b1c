use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

// --- Producer ---

pub static POLLS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("haul_producer_polls_total", "Poll cycles started")
        .expect("polls counter")
});

pub static PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "haul_producer_published_total",
        "Records acknowledged by the bus"
    )
    .expect("published counter")
});

/// Failed cycles by stage (`fetch`, `encode`, `publish`).
pub static CYCLE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "haul_producer_cycle_failures_total",
        "Poll cycles that did not publish a record",
        &["stage"]
    )
    .expect("cycle_failures counter")
});

pub static PUBLISH_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "haul_producer_publish_retries_total",
        "Publish attempts repeated after a failure"
    )
    .expect("publish_retries counter")
});

// --- Consumer ---

pub static RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("haul_consumer_received_total", "Records pulled from the bus")
        .expect("received counter")
});

pub static PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "haul_consumer_processed_total",
        "Records decoded and handled successfully"
    )
    .expect("processed counter")
});

/// Per-record failures by kind (`decode`, `handler`, `panic`).
pub static RECORD_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "haul_consumer_record_failures_total",
        "Records that could not be processed",
        &["kind"]
    )
    .expect("record_failures counter")
});

pub static COMMITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("haul_consumer_commits_total", "Successful offset commits")
        .expect("commits counter")
});

pub static BUS_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "haul_consumer_bus_errors_total",
        "Failed polls and commits",
        &["op"]
    )
    .expect("bus_errors counter")
});

pub static CLOCK_SKEW: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "haul_consumer_clock_skew_total",
        "Records whose last_updated went backwards for the same truck"
    )
    .expect("clock_skew counter")
});
