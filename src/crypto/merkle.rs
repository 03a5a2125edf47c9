//! Merkle tree commitment over a block's transactions
//!
//! Leaves are hashed, padded out to a power of two, then combined pairwise
//! (the two hex digests concatenated as text and re-hashed) until a single
//! root remains.

use super::hash::sha256_hex;

/// A node in the merkle tree
#[derive(Debug, Clone)]
pub struct MerkleNode {
    pub hash: String,
    pub left: Option<Box<MerkleNode>>,
    pub right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    /// Create a leaf node from raw leaf data
    pub fn leaf(data: &[u8]) -> Self {
        Self {
            hash: sha256_hex(data),
            left: None,
            right: None,
        }
    }

    /// Create an internal node from two children
    pub fn internal(left: MerkleNode, right: MerkleNode) -> Self {
        let hash = sha256_hex(format!("{}{}", left.hash, right.hash).as_bytes());

        Self {
            hash,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }
}

/// A fully built merkle tree
#[derive(Debug, Clone)]
pub struct MerkleTree {
    root: MerkleNode,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build the tree from ordered leaf data.
    ///
    /// Returns `None` for an empty leaf list: there is no root for zero leaves.
    pub fn build<T: AsRef<[u8]>>(leaves: &[T]) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let mut nodes: Vec<MerkleNode> = leaves
            .iter()
            .map(|data| MerkleNode::leaf(data.as_ref()))
            .collect();
        let leaf_count = nodes.len();

        fill_to_power_of_two(&mut nodes);

        while nodes.len() > 1 {
            let mut next_level = Vec::with_capacity(nodes.len() / 2);
            let mut iter = nodes.into_iter();
            while let (Some(left), Some(right)) = (iter.next(), iter.next()) {
                next_level.push(MerkleNode::internal(left, right));
            }
            nodes = next_level;
        }

        nodes.pop().map(|root| Self { root, leaf_count })
    }

    /// Hex digest of the root
    pub fn root_hash(&self) -> &str {
        &self.root.hash
    }

    /// Root node of the tree
    pub fn root(&self) -> &MerkleNode {
        &self.root
    }

    /// Number of leaves supplied before padding
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

/// Convenience: root hash of `leaves`, or `None` when there are none
pub fn merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> Option<String> {
    MerkleTree::build(leaves).map(|tree| tree.root.hash)
}

/// Duplicate the last leaf when the count is odd, then repeat the tail pair
/// until the count is a power of two. A single leaf is left alone.
fn fill_to_power_of_two(nodes: &mut Vec<MerkleNode>) {
    if nodes.len() <= 1 {
        return;
    }

    if nodes.len() % 2 == 1 {
        if let Some(last) = nodes.last().cloned() {
            nodes.push(last);
        }
    }

    let target = nodes.len().next_power_of_two();
    while nodes.len() < target {
        let tail = nodes[nodes.len() - 2..].to_vec();
        nodes.extend(tail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(left: &str, right: &str) -> String {
        sha256_hex(format!("{}{}", left, right).as_bytes())
    }

    #[test]
    fn test_merkle_root_single() {
        let root = merkle_root(&[b"tx1"]).unwrap();
        assert_eq!(root, sha256_hex(b"tx1"));
    }

    #[test]
    fn test_merkle_root_two() {
        let root = merkle_root(&[b"tx1", b"tx2"]).unwrap();
        assert_eq!(root, pair(&sha256_hex(b"tx1"), &sha256_hex(b"tx2")));
    }

    #[test]
    fn test_merkle_root_odd_duplicates_last() {
        let (a, b, c) = (sha256_hex(b"a"), sha256_hex(b"b"), sha256_hex(b"c"));
        let expected = pair(&pair(&a, &b), &pair(&c, &c));
        assert_eq!(merkle_root(&[b"a", b"b", b"c"]).unwrap(), expected);
    }

    #[test]
    fn test_merkle_root_pads_with_tail_pairs() {
        let leaves: Vec<String> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|s| sha256_hex(s.as_bytes()))
            .collect();
        let left = pair(&pair(&leaves[0], &leaves[1]), &pair(&leaves[2], &leaves[3]));
        let tail = pair(&leaves[4], &leaves[5]);
        let right = pair(&tail, &tail);

        let root = merkle_root(&[b"a", b"b", b"c", b"d", b"e", b"f"]).unwrap();
        assert_eq!(root, pair(&left, &right));
    }

    #[test]
    fn test_merkle_root_order_sensitive() {
        let forward = merkle_root(&[b"tx1", b"tx2", b"tx3"]).unwrap();
        let reversed = merkle_root(&[b"tx3", b"tx2", b"tx1"]).unwrap();
        assert_ne!(forward, reversed);
    }

    #[test]
    fn test_build_merkle_tree() {
        let tree = MerkleTree::build(&[b"tx1", b"tx2", b"tx3", b"tx4", b"tx5"]).unwrap();
        assert_eq!(tree.leaf_count(), 5);
        assert!(tree.root().left.is_some());
        assert_eq!(tree.root_hash().len(), 64);
    }

    #[test]
    fn test_empty_merkle_root() {
        let leaves: Vec<Vec<u8>> = vec![];
        assert!(MerkleTree::build(&leaves).is_none());
        assert!(merkle_root(&leaves).is_none());
    }
}
