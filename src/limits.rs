//! Operational caps. Requests past these bounds are rejected up front so a
//! single caller can't wedge the engine with a pathological payload.

/// Longest bookable range in calendar days (inclusive count).
pub const MAX_STAY_DAYS: i64 = 365;

/// Highest monthly discount a resource may carry, in percent.
pub const MAX_DISCOUNT_PERCENT: u8 = 90;

/// Highest daily rate a resource may carry, in the smallest currency unit.
/// Keeps `days * rate` far from i64 overflow even at the longest stay.
pub const MAX_DAILY_PRICE: i64 = 1_000_000_000;

/// Widest date window accepted by list queries, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 730;

/// Hard cap on rows returned by a single list query.
pub const MAX_LIST_LIMIT: usize = 200;

/// Longest accepted request line on the wire, in bytes.
pub const MAX_REQUEST_LINE_BYTES: usize = 64 * 1024;

/// Largest ledger frame accepted on replay. Anything bigger is treated as a
/// corrupt length prefix.
pub const MAX_EVENT_BYTES: u32 = 1024 * 1024;

/// Length of generated access tokens.
pub const ACCESS_TOKEN_LEN: usize = 16;

/// Default lock acquisition timeout in milliseconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 3_000;

/// Default lock hold timeout in milliseconds.
pub const DEFAULT_HOLD_TIMEOUT_MS: u64 = 10_000;
