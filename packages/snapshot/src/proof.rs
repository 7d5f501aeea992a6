//! Append-only proof: Merkle root over the CID closure and the
//! cross-snapshot consistency check.
//!
//! The closure of a snapshot is every CID reachable from its live set:
//! each entry's chain event, its manifest version history via `prev`, and
//! every component link of every manifest visited. The snapshot's own CID
//! is not part of its own proof.

use std::collections::{BTreeSet, HashSet};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use cairn_store::Store;

use crate::error::SnapshotError;
use crate::types::{ConsistencyInfo, Manifest, SnapshotEntry};

/// Cap on manifest version-chain walks, against pathological producers.
pub const MAX_VERSION_HOPS: usize = 100;

/// Deterministic binary SHA-256 tree over a CID set.
///
/// Leaves are `SHA-256(cid)` in lexicographic CID order; a level with an
/// odd node count duplicates its last node; the empty set hashes to
/// `SHA-256("")`. The root depends only on set membership.
pub fn merkle_root(cids: &BTreeSet<String>) -> String {
    if cids.is_empty() {
        return hex::encode(Sha256::digest(b""));
    }

    let mut level: Vec<[u8; 32]> = cids
        .iter()
        .map(|cid| Sha256::digest(cid.as_bytes()).into())
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(&pair[0]);
            let mut hasher = Sha256::new();
            hasher.update(left);
            hasher.update(right);
            next.push(hasher.finalize().into());
        }
        level = next;
    }

    hex::encode(level[0])
}

/// Compare the CID closures of two adjacent snapshots. Append-only holds
/// iff nothing present before is missing now.
pub fn generate_consistency_info(
    prev: &BTreeSet<String>,
    curr: &BTreeSet<String>,
) -> ConsistencyInfo {
    let deleted_count = prev.difference(curr).count() as u64;
    let added_count = curr.difference(prev).count() as u64;
    ConsistencyInfo {
        prev_cid_count: prev.len() as u64,
        curr_cid_count: curr.len() as u64,
        added_count,
        deleted_count,
        is_append_only: deleted_count == 0,
    }
}

/// Collect the CID closure of `entries`.
///
/// With a previous closure and the set of modified PIs, the walk starts
/// from a copy of the previous closure and only touches modified
/// entities; unmodified ones contribute nothing new by construction.
/// Without a baseline every entry is walked.
pub async fn collect_all_cids(
    store: &dyn Store,
    entries: &[SnapshotEntry],
    prev_all_cids: Option<&[String]>,
    modified_pis: Option<&HashSet<String>>,
) -> Result<BTreeSet<String>, SnapshotError> {
    let incremental = prev_all_cids.is_some();
    let mut cids: BTreeSet<String> = prev_all_cids
        .map(|prev| prev.iter().cloned().collect())
        .unwrap_or_default();
    let baseline = cids.len();

    // Shared across entries so version histories with common ancestry are
    // walked once per build.
    let mut visited: HashSet<String> = HashSet::new();
    let mut walked = 0usize;

    for entry in entries {
        if incremental {
            match modified_pis {
                Some(modified) if modified.contains(&entry.pi) => {}
                _ => continue,
            }
        }
        collect_entry_cids(store, entry, &mut cids, &mut visited).await;
        walked += 1;
        if walked % 100 == 0 {
            info!(walked, cids = cids.len(), "collecting cid closure");
        }
    }

    info!(
        entities_walked = walked,
        baseline,
        total = cids.len(),
        "cid closure collected"
    );
    Ok(cids)
}

/// Walk one entry: chain event CID, then the manifest version chain from
/// its tip, bounded by [`MAX_VERSION_HOPS`] and the per-build visited set.
async fn collect_entry_cids(
    store: &dyn Store,
    entry: &SnapshotEntry,
    cids: &mut BTreeSet<String>,
    visited: &mut HashSet<String>,
) {
    cids.insert(entry.chain_cid.cid.clone());

    let mut current = Some(entry.tip_cid.cid.clone());
    let mut hops = 0usize;
    while let Some(cid) = current.take() {
        if hops >= MAX_VERSION_HOPS {
            warn!(pi = %entry.pi, "version chain exceeded hop limit, truncating");
            break;
        }
        if !visited.insert(cid.clone()) {
            // Already walked from another entry or a cycle; either way the
            // remainder of this chain is accounted for.
            break;
        }
        cids.insert(cid.clone());

        let manifest: Manifest = match store.dag_get(&cid).await {
            Ok(value) => match serde_json::from_value(value) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(pi = %entry.pi, cid = %cid, error = %e, "unparseable manifest in version chain");
                    break;
                }
            },
            Err(e) => {
                warn!(pi = %entry.pi, cid = %cid, error = %e, "failed to fetch manifest in version chain");
                break;
            }
        };

        for link in manifest.components.values() {
            cids.insert(link.cid.clone());
        }
        current = manifest.prev.map(|l| l.cid);
        hops += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sha(parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }

    #[test]
    fn test_empty_set_root_is_hash_of_nothing() {
        assert_eq!(merkle_root(&BTreeSet::new()), hex::encode(Sha256::digest(b"")));
    }

    #[test]
    fn test_single_leaf_root() {
        let root = merkle_root(&set(&["a"]));
        assert_eq!(root, hex::encode(sha(&[b"a"])));
    }

    #[test]
    fn test_three_leaf_tree_pads_by_duplication() {
        // leaves:  h(a) h(b) h(c)
        // level 1: h(h(a)|h(b))  h(h(c)|h(c))
        // root:    h(level1[0] | level1[1])
        let ha = sha(&[b"a"]);
        let hb = sha(&[b"b"]);
        let hc = sha(&[b"c"]);
        let left = sha(&[&ha, &hb]);
        let right = sha(&[&hc, &hc]);
        let expected = hex::encode(sha(&[&left, &right]));

        let root = merkle_root(&set(&["a", "b", "c"]));
        assert_eq!(root, expected);
        assert_eq!(root.len(), 64);
    }

    #[test]
    fn test_root_ignores_insertion_order() {
        let forward: BTreeSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let backward: BTreeSet<String> = ["z", "x", "y"].iter().map(|s| s.to_string()).collect();
        assert_eq!(merkle_root(&forward), merkle_root(&backward));
    }

    #[test]
    fn test_root_changes_on_membership_change() {
        let full = set(&["a", "b", "c", "d"]);
        let mut missing = full.clone();
        missing.remove("c");
        assert_ne!(merkle_root(&full), merkle_root(&missing));
    }

    #[test]
    fn test_consistency_pure_addition() {
        // P has 10 CIDs, C has those plus 10 more.
        let prev: BTreeSet<String> = (0..10).map(|i| format!("cid{i:03}")).collect();
        let curr: BTreeSet<String> = (0..20).map(|i| format!("cid{i:03}")).collect();

        let info = generate_consistency_info(&prev, &curr);
        assert_eq!(info.prev_cid_count, 10);
        assert_eq!(info.curr_cid_count, 20);
        assert_eq!(info.added_count, 10);
        assert_eq!(info.deleted_count, 0);
        assert!(info.is_append_only);
    }

    #[test]
    fn test_consistency_detects_deletion() {
        // P: cid000..cid099, C: cid050..cid149. Fifty deleted, fifty added.
        let prev: BTreeSet<String> = (0..100).map(|i| format!("cid{i:03}")).collect();
        let curr: BTreeSet<String> = (50..150).map(|i| format!("cid{i:03}")).collect();

        let info = generate_consistency_info(&prev, &curr);
        assert_eq!(info.deleted_count, 50);
        assert_eq!(info.added_count, 50);
        assert!(!info.is_append_only);
    }
}
