//! Hash chain over evidence log entries.

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

/// Chain head before the first entry.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Hashes a log entry payload with the previous chain hash.
pub fn hash_entry(prev_hash: &[u8; 32], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash);
    hasher.update(payload);
    hasher.finalize().into()
}

/// One stored link of the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainLink<'a> {
    pub id: i64,
    pub payload: &'a [u8],
    pub prev_hash: [u8; 32],
    pub entry_hash: [u8; 32],
}

/// Walk links in order from the genesis hash; returns the number verified.
pub fn verify_links<'a, I>(links: I) -> Result<u64>
where
    I: IntoIterator<Item = ChainLink<'a>>,
{
    let mut expected_prev = GENESIS_HASH;
    let mut count = 0u64;
    for link in links {
        if link.prev_hash != expected_prev {
            return Err(anyhow!(
                "integrity check failed at id {}: prev_hash={}, expected_prev={}",
                link.id,
                hex::encode(link.prev_hash),
                hex::encode(expected_prev)
            ));
        }
        let computed = hash_entry(&expected_prev, link.payload);
        if computed != link.entry_hash {
            return Err(anyhow!(
                "integrity check failed at id {}: computed_hash={}, stored_hash={}",
                link.id,
                hex::encode(computed),
                hex::encode(link.entry_hash)
            ));
        }
        expected_prev = link.entry_hash;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_previous_link() {
        let a = hash_entry(&GENESIS_HASH, b"payload");
        let b = hash_entry(&[1u8; 32], b"payload");
        assert_ne!(a, b);
        assert_eq!(a, hash_entry(&GENESIS_HASH, b"payload"));
    }

    #[test]
    fn detects_broken_link() {
        let first = hash_entry(&GENESIS_HASH, b"one");
        let second = hash_entry(&first, b"two");
        let good = vec![
            ChainLink {
                id: 1,
                payload: b"one",
                prev_hash: GENESIS_HASH,
                entry_hash: first,
            },
            ChainLink {
                id: 2,
                payload: b"two",
                prev_hash: first,
                entry_hash: second,
            },
        ];
        assert_eq!(verify_links(good.clone()).unwrap(), 2);

        let mut skipped = good.clone();
        skipped.remove(0);
        assert!(verify_links(skipped).is_err());

        let mut edited = good;
        edited[1].payload = b"TWO";
        assert!(verify_links(edited).is_err());
    }
}
