/// Tracing initialization for the core. Called once at the start of
/// `AircastApp::new()`, before anything else; safe to call twice (later
/// inits are no-ops).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aircast_core=debug,info".into()),
        )
        .try_init();
}
