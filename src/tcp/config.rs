/// Largest payload carried by a single outbound segment.
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Default stream capacity for either direction of a connection.
pub const DEFAULT_CAPACITY: usize = 64000;

/// Default retransmission timeout before any back-off.
pub const DEFAULT_RT_TIMEOUT_MS: u64 = 1000;
