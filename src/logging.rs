// logging.rs - Console trace setup shared by the binaries

use tracing_subscriber::EnvFilter;

/// Compact stdout logging without timestamps. `RUST_LOG` overrides the
/// default `info` level; `verbose` lowers it to `debug`.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .compact()
        .try_init();

    update_panic_hook();
}

fn update_panic_hook() {
    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC => {}", info);
        hook(info);
    }));
}
