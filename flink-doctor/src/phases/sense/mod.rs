mod metric_fetcher;

pub use metric_fetcher::{Snapshot, SnapshotFetcher};
