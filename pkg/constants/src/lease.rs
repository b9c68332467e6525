//! Lease broker constants.

/// Fixed prefix prepended to every client-supplied key before it is stored.
/// Never configurable per request.
pub const LEASE_KEY_PREFIX: &str = "/shared-lock/";

/// TTL used when the client omits the TTL header or sends one we can't parse.
pub const DEFAULT_LEASE_TTL_SECS: u64 = 10;

/// Request header carrying the lease TTL as a duration literal (`3s`, `1m`).
pub const LEASE_TTL_HEADER: &str = "x-lease-ttl";

/// Hard per-call deadline for the presence probe against the store.
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// How often the cache sweeper wakes to drop expired entries.
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 1;

/// Value stored under the key when the client sends an empty one.
pub const DEFAULT_LEASE_VALUE: &str = "lock-value";
