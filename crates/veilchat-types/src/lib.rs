//! Core shared types for the Veilchat secure-messaging node.
//!
//! This crate defines the unified error surface used across the workspace.
//! No other crate should define shared error types — everything lives here.

use thiserror::Error;

// ---------------------------------------------------------------------------
// VeilError
// ---------------------------------------------------------------------------

/// Central error type for the Veilchat system.
///
/// All crates in the workspace convert their internal errors into variants
/// of this enum, ensuring a unified error handling surface. Startup treats
/// `Storage`, `KeyFormat`, `NetworkAssembly`, and `Config` as fatal;
/// everything else is recoverable and handled at the call site.
#[derive(Debug, Error)]
pub enum VeilError {
    /// A local database operation failed.
    #[error("storage error: {reason}")]
    Storage {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A persisted identity key could not be decoded or re-encoded.
    #[error("key format error: {reason}")]
    KeyFormat {
        /// Human-readable description of the key codec failure.
        reason: String,
    },

    /// Building the network stack (transport, behaviours, listeners) failed.
    #[error("network assembly error: {reason}")]
    NetworkAssembly {
        /// Human-readable description of the assembly failure.
        reason: String,
    },

    /// A peer-discovery subsystem failed in a way the node can survive.
    #[error("discovery error: {reason}")]
    Discovery {
        /// Human-readable description of the discovery failure.
        reason: String,
    },

    /// Dialing or validating a peer address failed.
    #[error("peer connect error: {reason}")]
    PeerConnect {
        /// Human-readable description of the connection failure.
        reason: String,
    },

    /// Subscribing to a broadcast channel was rejected.
    #[error("channel join error: {reason}")]
    Join {
        /// Human-readable description of the subscription failure.
        reason: String,
    },

    /// Publishing to a broadcast channel was rejected.
    #[error("channel publish error: {reason}")]
    Publish {
        /// Human-readable description of the publish failure.
        reason: String,
    },

    /// A required external artifact (e.g. the sidecar binary) is missing.
    #[error("not found: {reason} ({hint})")]
    NotFound {
        /// What was missing and where it was looked for.
        reason: String,
        /// Actionable remediation for the operator.
        hint: String,
    },

    /// Spawning or managing the sidecar process failed.
    #[error("spawn error: {reason}")]
    Spawn {
        /// Human-readable description of the process failure.
        reason: String,
    },

    /// A sidecar health probe failed or timed out.
    #[error("health check error: {reason}")]
    HealthCheck {
        /// Human-readable description of the probe failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

impl VeilError {
    /// Whether this error should abort node startup.
    ///
    /// Soft failures (discovery, sidecar, health) degrade the node but
    /// leave it running; hard failures make the process useless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. }
                | Self::KeyFormat { .. }
                | Self::NetworkAssembly { .. }
                | Self::Config { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`VeilError`].
pub type Result<T> = std::result::Result<T, VeilError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_reason() {
        let err = VeilError::Storage {
            reason: "disk full".into(),
        };
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn not_found_display_contains_hint() {
        let err = VeilError::NotFound {
            reason: "sidecar binary missing".into(),
            hint: "build the engine first".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sidecar binary missing"));
        assert!(msg.contains("build the engine first"));
    }

    #[test]
    fn fatal_classification() {
        let fatal = VeilError::NetworkAssembly {
            reason: "no transport".into(),
        };
        let soft = VeilError::Discovery {
            reason: "mdns unavailable".into(),
        };
        assert!(fatal.is_fatal());
        assert!(!soft.is_fatal());
    }

    #[test]
    fn publish_error_is_surfaced_not_fatal() {
        let err = VeilError::Publish {
            reason: "topic closed".into(),
        };
        assert!(!err.is_fatal());
    }
}
