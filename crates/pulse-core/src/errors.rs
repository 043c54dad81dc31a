//! Protocol-level errors.

use thiserror::Error;

/// Errors arising from wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match any known shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_wraps_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{{").unwrap_err();
        let protocol: ProtocolError = err.into();
        assert!(protocol.to_string().starts_with("malformed frame"));
    }
}
