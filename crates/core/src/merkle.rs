//! Merkle root computation over transaction hashes.

use crate::UInt256;

/// Computes the merkle root of `hashes`, duplicating the trailing element of
/// odd levels. An empty set yields the zero hash.
pub fn merkle_root(hashes: &[UInt256]) -> UInt256 {
    if hashes.is_empty() {
        return UInt256::zero();
    }
    let mut level: Vec<UInt256> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = *pair.last().unwrap();
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(left.as_bytes());
            data.extend_from_slice(right.as_bytes());
            next.push(UInt256::from_array(neonova_crypto::hash256(&data)));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_hash_is_its_own_root() {
        let h = UInt256::from_array([3; 32]);
        assert_eq!(merkle_root(&[h]), h);
    }

    #[test]
    fn empty_set_is_zero() {
        assert_eq!(merkle_root(&[]), UInt256::zero());
    }

    #[test]
    fn odd_level_duplicates_last() {
        let a = UInt256::from_array([1; 32]);
        let b = UInt256::from_array([2; 32]);
        let c = UInt256::from_array([3; 32]);
        // Root of [a, b, c] equals root of [a, b, c, c].
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
        assert_ne!(merkle_root(&[a, b, c]), merkle_root(&[a, b]));
    }
}
