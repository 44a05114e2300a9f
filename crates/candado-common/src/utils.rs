//! Time and token helpers shared across the workspace

use rand::RngCore;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Used only for store-side expiry bookkeeping. Elapsed-time arithmetic in
/// the quorum coordinator uses monotonic clocks, never this.
pub fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Generate a 128-bit random ownership token, hex-encoded.
///
/// Collision across concurrent acquirers of the same key is what proves
/// ownership on release, so the token must come from a CSPRNG.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    const_hex::encode(bytes)
}
