pub const TIME_LIMIT_EXCEEDED_OUTPUT: &str = "time limit exceeded";
pub const MEMORY_LIMIT_EXCEEDED_OUTPUT: &str = "memory limit exceeded";

pub const NO_TEST_CASES_MSG: &str = "cannot judge without test cases";
pub const SYSTEM_ERROR_MSG: &str = "the judge could not run this submission, please try again later";

pub const TRUNCATION_MARKER: &str = "\n... (output truncated)";

/// Extra wall-clock time the `/execute` handler grants on top of the
/// program's own limit before it gives up on the sandbox.
pub const EXECUTE_GRACE_MS: u64 = 5_000;

pub const RETRY_BACKOFF_MS: u64 = 500;

/// `RLIMIT_AS` is set to this multiple of the memory limit. Interpreters map
/// far more virtual memory than they touch, so RSS sampling does the real
/// enforcement.
pub const ADDRESS_SPACE_HEADROOM: u64 = 4;

/// Python's out-of-memory exception, printed when `RLIMIT_AS` refuses an
/// allocation before the RSS watcher notices.
pub const MEMORY_ERROR_MARKER: &str = "MemoryError";
