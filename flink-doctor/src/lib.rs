#![forbid(unsafe_code)]
#![warn(
    clippy::cargo,
    clippy::suspicious,
    // missing_docs,
    clippy::nursery,
    rust_2018_idioms
)]

pub mod engine;
pub mod flink;
pub mod logging;
pub mod math;
pub mod metrics;
pub mod phases;
pub mod report;
pub mod settings;

pub type Result<T> = anyhow::Result<T>;
