pub mod api;
pub mod bus;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod eda_filter;
pub mod envelope;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod producer;
pub mod retry;
pub mod shutdown;
pub mod source;
pub mod subjects;
