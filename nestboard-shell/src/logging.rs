use env_logger::Target;
use log::SetLoggerError;

/// Install the stderr logger. `RUST_LOG` overrides the default `warn` filter,
/// e.g. `RUST_LOG=debug` to see history eviction and replay skips.
pub fn init() -> Result<(), SetLoggerError> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.target(Target::Stderr);
    builder.try_init()
}
