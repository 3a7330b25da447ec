use std::time::Duration;

pub const APP_NAME: &str = "keg";

/// Upper bound for one fetch attempt.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound for one install step or acceptance test.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(600);

/// Retries after the first failed fetch attempt.
pub const DEFAULT_FETCH_RETRIES: u32 = 3;

/// Base backoff between fetch attempts, multiplied by the attempt number.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Variables passed from the engine's environment into sandboxes by default.
pub const DEFAULT_ENV_PASSTHROUGH: &[&str] = &["HOME", "PATH"];

/// 1980-01-01T00:00:00Z, the ZIP epoch.
pub const SOURCE_DATE_EPOCH: &str = "315532800";

/// Maximum captured bytes of a failing step's stderr kept in error reports.
pub const STDERR_TAIL_BYTES: usize = 4096;
