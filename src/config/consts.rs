/// Default budget for a single request (two minutes)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
/// Default time a worker has to signal ready after launch
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;
/// Application name exported to workers when the config omits one
pub const DEFAULT_APP_NAME: &str = "upm";
/// Time a worker has to exit after SIGTERM before it is killed
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;
/// Largest accepted request, startup or stop budget (seven days)
pub const MAX_TIMEOUT_MS: u64 = 7 * 24 * 60 * 60 * 1000;
