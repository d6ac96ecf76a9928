// Shared tuning constants

/// How much history each entity buffer retains, in milliseconds of sender
/// time. Appending evicts from the front until the window fits.
pub const RETENTION_WINDOW_MS: i64 = 1000;

/// Fixed render-behind-now delay in milliseconds. Sampling this far in the
/// past keeps the interpolator between received samples instead of
/// extrapolating ahead of the newest one.
pub const LATENCY_BUFFER_MS: i64 = 100;

/// Render loop cadence in milliseconds (20 Hz).
pub const SAMPLE_INTERVAL_MS: u64 = 50;

/// Delay between relay connection attempts, in seconds. Fixed, no backoff.
pub const RECONNECT_DELAY_SECS: u64 = 5;

/// Keepalive ping interval on the relay connection, in seconds.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Interpolation intervals narrower than this many milliseconds are
/// treated as zero-width to avoid dividing by a near-zero denominator.
pub const INTERP_EPSILON_MS: f64 = 0.001;

/// Entities with no telegram for this long (local wall time) are evicted.
pub const IDLE_TIMEOUT_MS: i64 = 60_000;

/// How often the idle-entity sweep runs, in seconds.
pub const IDLE_SWEEP_SECS: u64 = 10;

/// How often the status snapshot file is rewritten, in seconds.
pub const WRITE_STATE_SECS: u64 = 5;

/// Feet to meters
pub const FTOM: f64 = 0.3048;

/// Meters to feet
pub const MTOF: f64 = 1.0 / FTOM;
