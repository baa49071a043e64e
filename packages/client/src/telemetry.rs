use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a console subscriber filtered by `filters`.
/// Errors if a global subscriber was already set.
pub fn init_tracing(filters: tracing_subscriber::EnvFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filters)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    tracing::debug!("Tracing initialized");

    Ok(())
}
