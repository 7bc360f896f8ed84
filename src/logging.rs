use env_logger::Env;

/// Installs the `env_logger` backend with an `info` default, overridable
/// through `RUST_LOG`. Later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
}
