/// Binary Merkle trees for reputation commitments.
///
/// Leaves and internal nodes are SHA3-256 digests. An internal node is
/// `H(left || right)`; a level with an odd node count pairs the last node
/// with itself. A proof is the list of siblings from leaf to root, and the
/// leaf index's bits (least significant first) say whether the running hash
/// sits on the left (0) or right (1) at each level.
///
/// Reputation leaves hash `(address, value, timestamp)` in exactly that
/// order; proofs produced by other chains depend on it.
use crate::error::{CryptoError, CryptoResult};
use hat_core::{Address, Hash256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = Sha3_256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    Hash256(hasher.finalize().into())
}

/// Leaf for one reputation datum: `H(address[20] || value i64 BE || timestamp u64 BE)`.
pub fn reputation_leaf(address: &Address, value: i64, timestamp: u64) -> Hash256 {
    let mut hasher = Sha3_256::new();
    hasher.update(address.0);
    hasher.update(value.to_be_bytes());
    hasher.update(timestamp.to_be_bytes());
    Hash256(hasher.finalize().into())
}

/// Inclusion proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf being proved
    pub leaf_index: u64,

    /// The leaf itself
    pub leaf: Hash256,

    /// Siblings from the leaf level upward
    pub path: Vec<Hash256>,
}

impl MerkleProof {
    pub fn verify(&self, root: &Hash256) -> bool {
        verify_merkle_proof(root, &self.leaf, &self.path, self.leaf_index)
    }
}

/// Recomputes the root from `leaf` along `path` and compares it to `root`.
///
/// An index with bits set above the path depth is rejected; otherwise two
/// indices would verify the same proof.
pub fn verify_merkle_proof(root: &Hash256, leaf: &Hash256, path: &[Hash256], index: u64) -> bool {
    if path.len() < 64 && (index >> path.len()) != 0 {
        return false;
    }
    if path.len() > 64 {
        return false;
    }

    let mut current = *leaf;
    for (level, sibling) in path.iter().enumerate() {
        current = if (index >> level) & 1 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
    }
    current == *root
}

/// Fully materialized tree, levels stored bottom-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: Vec<Hash256>) -> CryptoResult<Self> {
        if leaves.is_empty() {
            return Err(CryptoError::EmptyTree);
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last() {
            if current.len() == 1 {
                break;
            }
            let next: Vec<Hash256> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }
        Ok(MerkleTree { levels })
    }

    pub fn root(&self) -> Hash256 {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(Hash256::ZERO)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    pub fn proof(&self, index: usize) -> CryptoResult<MerkleProof> {
        let leaves = self.leaf_count();
        if index >= leaves {
            return Err(CryptoError::LeafOutOfBounds { index, leaves });
        }

        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if position % 2 == 0 {
                // Odd tail pairs with itself.
                level.get(position + 1).unwrap_or(&level[position])
            } else {
                &level[position - 1]
            };
            path.push(*sibling);
            position /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index as u64,
            leaf: self.levels[0][index],
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<Hash256> {
        (0..n)
            .map(|i| reputation_leaf(&Address([i as u8; 20]), i as i64 - 3, 1_700_000_000 + i as u64))
            .collect()
    }

    fn check_tree(n: usize) {
        let tree = MerkleTree::from_leaves(leaves(n)).unwrap();
        let root = tree.root();
        for i in 0..n {
            let proof = tree.proof(i).unwrap();
            assert!(proof.verify(&root), "leaf {} of {} should verify", i, n);

            // Corrupt each path element in turn.
            for j in 0..proof.path.len() {
                let mut bad = proof.clone();
                bad.path[j].0[0] ^= 0x01;
                assert!(!bad.verify(&root), "corrupted path[{}] of leaf {} of {}", j, i, n);
            }

            let mut bad_leaf = proof.clone();
            bad_leaf.leaf.0[31] ^= 0x80;
            assert!(!bad_leaf.verify(&root));

            let mut bad_root = root;
            bad_root.0[5] ^= 0xff;
            assert!(!proof.verify(&bad_root));
        }
    }

    #[test]
    fn test_proofs_single_leaf() {
        check_tree(1);
        let tree = MerkleTree::from_leaves(leaves(1)).unwrap();
        assert_eq!(tree.root(), leaves(1)[0]);
        assert!(tree.proof(0).unwrap().path.is_empty());
    }

    #[test]
    fn test_proofs_two_leaves() {
        check_tree(2);
    }

    #[test]
    fn test_proofs_five_leaves() {
        check_tree(5);
    }

    #[test]
    fn test_proofs_sixteen_leaves() {
        check_tree(16);
    }

    #[test]
    fn test_index_beyond_depth_rejected() {
        let tree = MerkleTree::from_leaves(leaves(4)).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(!verify_merkle_proof(&tree.root(), &proof.leaf, &proof.path, 1 + 4));
        assert!(!verify_merkle_proof(&tree.root(), &proof.leaf, &proof.path, 0));
    }

    #[test]
    fn test_empty_and_out_of_bounds() {
        assert!(matches!(MerkleTree::from_leaves(vec![]), Err(CryptoError::EmptyTree)));
        let tree = MerkleTree::from_leaves(leaves(3)).unwrap();
        assert!(matches!(tree.proof(3), Err(CryptoError::LeafOutOfBounds { index: 3, leaves: 3 })));
    }

    #[test]
    fn test_leaf_field_order_matters() {
        let a = Address([9u8; 20]);
        assert_ne!(reputation_leaf(&a, 5, 6), reputation_leaf(&a, 6, 5));
        assert_eq!(reputation_leaf(&a, 5, 6), reputation_leaf(&a, 5, 6));
    }

    proptest! {
        #[test]
        fn prop_every_leaf_proves(n in 1usize..40, pick in any::<prop::sample::Index>()) {
            let tree = MerkleTree::from_leaves(leaves(n)).unwrap();
            let i = pick.index(n);
            prop_assert!(tree.proof(i).unwrap().verify(&tree.root()));
        }
    }
}
