use crate::Result;

/// Default directives: quiet third-party crates, info for the tracker itself.
/// `RUST_LOG` overrides the whole set.
#[cfg(feature = "tracing")]
fn default_filter(service_name: &str) -> String {
    format!("warn,askbot_core=info,askbot=info,{service_name}=info")
}

/// Initialize tracing for the tracker host.
///
/// Compiled to a no-op unless the `tracing` feature is enabled, so offline
/// builds keep a stable API without the subscriber stack.
pub fn init(service_name: &str) -> Result<()> {
    let _ = service_name;

    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(service_name)));

        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    Ok(())
}
