use std::sync::Once;

static INIT: Once = Once::new();

/// One time logging setup, safe to call more than once
pub fn init() {
    INIT.call_once(|| {
        set_env();

        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("scanbridge=info"));

        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

fn set_env() {
    #[cfg(debug_assertions)]
    {
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "scanbridge=debug")
        }
    }

    #[cfg(not(debug_assertions))]
    {
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "scanbridge=info")
        }
    }
}
