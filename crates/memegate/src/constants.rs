/// Credits granted to a freshly issued token.
pub const DEFAULT_INITIAL_GRANT: i64 = 100;

/// Total attempts the issuer makes when a generated token collides with an existing one.
pub const DEFAULT_ISSUE_ATTEMPTS: u32 = 3;

/// Credits spent by one admitted request.
pub const CREDITS_PER_CALL: i64 = 1;

/// Number of leading token characters that may appear in logs.
pub const TOKEN_LOG_PREFIX_LEN: usize = 8;

/// How long a SQLite writer waits on a locked database before failing.
pub const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;
