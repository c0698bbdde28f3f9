use once_cell::sync::Lazy;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Subscriber shared by unit and integration tests. Output is discarded unless `TEST_LOG` is set.
pub static TEST_TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info";
    let subscriber_name = "test";
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        let _ = init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        let _ = init_subscriber(subscriber);
    };
});

/// Compose the bunyan-formatted subscriber. `RUST_LOG` overrides `log_directives` when present.
pub fn get_subscriber<S>(name: impl Into<String>, log_directives: impl AsRef<str>, sink: S) -> impl Subscriber + Send + Sync
where
    S: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_directives.as_ref()));
    let bunyan_formatting = BunyanFormattingLayer::new(name.into(), sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(bunyan_formatting)
}

pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> Result<(), SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(subscriber)
}
