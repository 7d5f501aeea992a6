//! Per-entity tip files.
//!
//! A tip file holds exactly the CID of an entity's latest manifest, at
//! `index/<pi[0:2]>/<pi[2:4]>/<pi>.tip` under the mutable namespace. It
//! denormalizes the newest manifest pointer so readers avoid a chain walk.

use cairn_store::{Cid, FilesWriteOpts, Store, StoreError};

use crate::error::IndexError;

/// Root of the tip-file tree in the mutable namespace.
pub const TIP_ROOT: &str = "/cairn/index";

/// Validate a PI: at least 4 ASCII characters, no path separators. The
/// first four characters shard the tip path.
pub fn validate_pi(pi: &str) -> Result<(), IndexError> {
    if pi.len() < 4 || !pi.is_ascii() || pi.contains('/') {
        return Err(IndexError::InvalidPi(pi.to_string()));
    }
    Ok(())
}

/// Mutable path of the tip file for a PI. The PI must be validated.
pub fn tip_path(pi: &str) -> String {
    format!("{TIP_ROOT}/{}/{}/{pi}.tip", &pi[..2], &pi[2..4])
}

/// Read the current manifest CID for a PI.
pub async fn read_tip(store: &dyn Store, pi: &str) -> Result<Cid, StoreError> {
    let bytes = store.files_read(&tip_path(pi)).await?;
    let cid = String::from_utf8_lossy(&bytes).trim().to_string();
    if cid.is_empty() {
        return Err(StoreError::Protocol(format!("empty tip file for {pi}")));
    }
    Ok(cid)
}

/// Overwrite the tip file for a PI with a new manifest CID. Parent
/// directories are created as needed.
pub async fn write_tip(store: &dyn Store, pi: &str, manifest_cid: &str) -> Result<(), StoreError> {
    store
        .files_write(
            &tip_path(pi),
            manifest_cid.as_bytes().to_vec(),
            FilesWriteOpts::default(),
        )
        .await
}
