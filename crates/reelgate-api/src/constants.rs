//! API constants

/// Version of the public HTTP contract
pub const API_VERSION: &str = "v1";

/// Prefix of every versioned route
pub const API_PREFIX: &str = "/api/v1";

/// Room for multipart framing and the text fields around one chunk
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;
