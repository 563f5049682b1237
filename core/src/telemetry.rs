use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for the Quill workspace.
///
/// Safe to call more than once; later calls (from tests or the xtask
/// binary) are no-ops.
pub fn init_tracing(filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
