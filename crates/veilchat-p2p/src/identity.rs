//! Node identity persistence.
//!
//! The libp2p keypair lives in the `system_config` tree under a
//! well-known key, protobuf-encoded. A node keeps the same PeerId
//! across restarts; the key is generated exactly once.

use libp2p::identity::Keypair;
use libp2p::PeerId;

use veilchat_store::ConfigStore;
use veilchat_types::{Result, VeilError};

/// Config key under which the protobuf-encoded keypair is stored.
pub const IDENTITY_CONFIG_KEY: &str = "p2p_private_key";

/// Loads the node identity from the store, generating and persisting
/// a fresh Ed25519 keypair on first run.
///
/// # Errors
///
/// - [`VeilError::KeyFormat`] if a stored key exists but cannot be
///   decoded. The corrupt key is left in place for inspection; it is
///   never silently replaced.
/// - [`VeilError::Storage`] if reading or writing the store fails.
pub fn get_or_create_identity(store: &ConfigStore) -> Result<(Keypair, PeerId)> {
    if let Some(raw) = store.get_config(IDENTITY_CONFIG_KEY)? {
        let keypair = Keypair::from_protobuf_encoding(&raw).map_err(|e| VeilError::KeyFormat {
            reason: format!("stored identity key is unparseable: {e}"),
        })?;
        let peer_id = keypair.public().to_peer_id();
        tracing::info!(%peer_id, "loaded existing node identity");
        return Ok((keypair, peer_id));
    }

    let keypair = Keypair::generate_ed25519();
    let raw = keypair.to_protobuf_encoding().map_err(|e| VeilError::KeyFormat {
        reason: format!("failed to encode new identity key: {e}"),
    })?;
    store.set_config(IDENTITY_CONFIG_KEY, &raw)?;

    let peer_id = keypair.public().to_peer_id();
    tracing::info!(%peer_id, "generated and persisted new node identity");
    Ok((keypair, peer_id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(&dir.path().join("db")).unwrap();
        (dir, store)
    }

    #[test]
    fn first_run_generates_and_persists() {
        let (_dir, store) = open_temp();
        let (_, peer_id) = get_or_create_identity(&store).unwrap();
        let stored = store.get_config(IDENTITY_CONFIG_KEY).unwrap();
        assert!(stored.is_some());
        let decoded = Keypair::from_protobuf_encoding(&stored.unwrap()).unwrap();
        assert_eq!(decoded.public().to_peer_id(), peer_id);
    }

    #[test]
    fn repeated_calls_return_same_peer_id() {
        let (_dir, store) = open_temp();
        let (_, first) = get_or_create_identity(&store).unwrap();
        let (_, second) = get_or_create_identity(&store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn identity_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let first = {
            let store = ConfigStore::open(&path).unwrap();
            let (_, peer_id) = get_or_create_identity(&store).unwrap();
            store.flush().unwrap();
            peer_id
        };
        let store = ConfigStore::open(&path).unwrap();
        let (_, second) = get_or_create_identity(&store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_key_is_an_error_not_a_regeneration() {
        let (_dir, store) = open_temp();
        store.set_config(IDENTITY_CONFIG_KEY, b"not a protobuf key").unwrap();
        let err = get_or_create_identity(&store).unwrap_err();
        assert!(matches!(err, VeilError::KeyFormat { .. }));
        // The corrupt blob must remain untouched.
        assert_eq!(
            store.get_config(IDENTITY_CONFIG_KEY).unwrap(),
            Some(b"not a protobuf key".to_vec())
        );
    }
}
