use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console logging on stderr so table previews on stdout stay readable.
/// `RUST_LOG` overrides the default `cafe_site_report=info` directive.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cafe_site_report=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
