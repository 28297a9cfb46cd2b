//! Radix trie over 4-bit nibbles producing a content-addressed root digest.
//!
//! Block assembly and block validation both build a trie over the same set
//! of transaction digests and must arrive at byte-identical roots, so
//! insertion is order-independent. An inclusion proof walks the
//! root-to-leaf path: every branch on the path contributes its sixteen
//! child-slot digests (empty slots as a fixed all-zero digest) and the
//! leaf contributes its own hash. Off-path subtrees appear only as opaque
//! digests, so proofs are meaningful against a root obtained from an
//! honestly rebuilt trie, not from an untrusted proof-sender alone.

use blake3::Hasher;

const LEAF_TAG: u8 = 0x00;
const BRANCH_TAG: u8 = 0x01;
const EMPTY_SLOT: [u8; 32] = [0u8; 32];

/// High nibble first: each key byte contributes two path steps.
pub fn bytes_to_nibbles(key: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(key.len() * 2);
    for b in key {
        nibbles.push(b >> 4);
        nibbles.push(b & 0x0F);
    }
    nibbles
}

enum Node {
    Leaf {
        // Nibble suffix below the parent branch, not the whole key.
        suffix: Vec<u8>,
        value: Vec<u8>,
    },
    Branch {
        children: [Option<Box<Node>>; 16],
        // Set only by an insertion that ends exactly at this branch.
        value: Option<Vec<u8>>,
    },
}

impl Node {
    fn empty_branch() -> Node {
        Node::Branch {
            children: std::array::from_fn(|_| None),
            value: None,
        }
    }

    fn hash(&self) -> [u8; 32] {
        match self {
            Node::Leaf { suffix, value } => {
                let mut h = Hasher::new();
                h.update(&[LEAF_TAG]);
                h.update(suffix);
                h.update(value);
                h.finalize().into()
            }
            Node::Branch { children, value } => {
                let mut h = Hasher::new();
                h.update(&[BRANCH_TAG]);
                for child in children {
                    match child {
                        Some(node) => h.update(&node.hash()),
                        None => h.update(&EMPTY_SLOT),
                    };
                }
                if let Some(v) = value {
                    h.update(v);
                }
                h.finalize().into()
            }
        }
    }

    fn insert(self, path: &[u8], new_value: Vec<u8>) -> Node {
        match self {
            Node::Leaf { suffix, value } => {
                if suffix == path {
                    return Node::Leaf {
                        suffix,
                        value: new_value,
                    };
                }
                // Split on conflict: demote this leaf into a branch that
                // carries both the old entry and the new one.
                Node::empty_branch()
                    .insert(&suffix, value)
                    .insert(path, new_value)
            }
            Node::Branch { mut children, value } => {
                let Some((&index, rest)) = path.split_first() else {
                    return Node::Branch {
                        children,
                        value: Some(new_value),
                    };
                };
                let slot = &mut children[index as usize];
                *slot = Some(match slot.take() {
                    Some(child) => Box::new(child.insert(rest, new_value)),
                    None => Box::new(Node::Leaf {
                        suffix: rest.to_vec(),
                        value: new_value,
                    }),
                });
                Node::Branch { children, value }
            }
        }
    }

    fn get(&self, path: &[u8]) -> Option<&[u8]> {
        match self {
            Node::Leaf { suffix, value } => {
                (suffix.as_slice() == path).then_some(value.as_slice())
            }
            Node::Branch { children, value } => {
                let Some((&index, rest)) = path.split_first() else {
                    return value.as_deref();
                };
                children[index as usize].as_ref()?.get(rest)
            }
        }
    }

    // Root-first walk. Branches append their sixteen child digests, the
    // terminal leaf appends its hash. A missing key leaves the proof
    // ending on the slate of the deepest branch reached.
    fn prove(&self, path: &[u8], proof: &mut Vec<[u8; 32]>) {
        match self {
            Node::Leaf { suffix, .. } => {
                if suffix.as_slice() == path {
                    proof.push(self.hash());
                }
            }
            Node::Branch { children, .. } => {
                for child in children {
                    proof.push(match child {
                        Some(node) => node.hash(),
                        None => EMPTY_SLOT,
                    });
                }
                let Some((&index, rest)) = path.split_first() else {
                    return;
                };
                if let Some(child) = &children[index as usize] {
                    child.prove(rest, proof);
                }
            }
        }
    }
}

pub struct DigestTrie {
    root: Node,
}

impl Default for DigestTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestTrie {
    pub fn new() -> Self {
        Self {
            root: Node::empty_branch(),
        }
    }

    pub fn insert(&mut self, key: &[u8], value: &[u8]) {
        let path = bytes_to_nibbles(key);
        let root = std::mem::replace(&mut self.root, Node::empty_branch());
        self.root = root.insert(&path, value.to_vec());
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.root.get(&bytes_to_nibbles(key))
    }

    pub fn root_hash(&self) -> [u8; 32] {
        self.root.hash()
    }

    /// Ordered digests along the path to `key`: sixteen child-slot entries
    /// per branch level, then the leaf hash. Callers must treat a proof
    /// that does not end in a matching leaf as non-inclusion.
    pub fn generate_proof(&self, key: &[u8]) -> Vec<[u8; 32]> {
        let mut proof = Vec::new();
        self.root.prove(&bytes_to_nibbles(key), &mut proof);
        proof
    }
}

/// Trie used for block roots: every transaction digest is inserted with
/// key == value.
pub fn build_from_hashes(hashes: &[[u8; 32]]) -> (DigestTrie, [u8; 32]) {
    let mut trie = DigestTrie::new();
    for h in hashes {
        trie.insert(h, h);
    }
    let root = trie.root_hash();
    (trie, root)
}

/// Recomputes the leaf hash for (`key`, `expected_value`) and rebuilds
/// every ancestor bottom-up from the claimed child slates, requiring the
/// recomputed child at each level to sit in the slot dictated by the
/// key's nibble at that depth, and the final hash to equal `root_hash`.
///
/// Only value-less branches can appear on a path here, which holds for
/// any trie built over equal-length keys (one key can then never be a
/// strict prefix of another).
pub fn verify_proof(
    root_hash: &[u8; 32],
    key: &[u8],
    expected_value: &[u8],
    proof: &[[u8; 32]],
) -> bool {
    // One leaf entry plus a whole 16-slot slate per branch level. A proof
    // that stopped at a branch (absent key) never has this shape.
    if proof.is_empty() || (proof.len() - 1) % 16 != 0 {
        return false;
    }
    let depth = (proof.len() - 1) / 16;
    let nibbles = bytes_to_nibbles(key);
    if depth > nibbles.len() {
        return false;
    }

    let mut current: [u8; 32] = {
        let mut h = Hasher::new();
        h.update(&[LEAF_TAG]);
        h.update(&nibbles[depth..]);
        h.update(expected_value);
        h.finalize().into()
    };
    if proof[proof.len() - 1] != current {
        return false;
    }

    for level in (0..depth).rev() {
        let slate = &proof[level * 16..(level + 1) * 16];
        if slate[nibbles[level] as usize] != current {
            return false;
        }
        let mut h = Hasher::new();
        h.update(&[BRANCH_TAG]);
        for entry in slate {
            h.update(entry);
        }
        current = h.finalize().into();
    }

    current == *root_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn digests(seeds: &[u8]) -> Vec<[u8; 32]> {
        seeds.iter().map(|s| *blake3::hash(&[*s]).as_bytes()).collect()
    }

    #[test]
    fn lookup_after_insert() {
        let mut trie = DigestTrie::new();
        trie.insert(b"abc", b"1");
        trie.insert(b"abd", b"2");

        assert_eq!(trie.get(b"abc"), Some(&b"1"[..]));
        assert_eq!(trie.get(b"abd"), Some(&b"2"[..]));
        assert_eq!(trie.get(b"abe"), None);
    }

    #[test]
    fn reinserting_a_key_replaces_its_value() {
        let mut trie = DigestTrie::new();
        trie.insert(b"abc", b"1");
        trie.insert(b"abc", b"2");
        assert_eq!(trie.get(b"abc"), Some(&b"2"[..]));
    }

    #[test]
    fn root_ignores_insertion_order_smoke() {
        let hashes = digests(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let (_, forward) = build_from_hashes(&hashes);

        let mut reversed = hashes.clone();
        reversed.reverse();
        let (_, backward) = build_from_hashes(&reversed);

        assert_eq!(forward, backward);
    }

    #[test]
    fn roots_differ_for_different_sets() {
        let (_, a) = build_from_hashes(&digests(&[1, 2, 3]));
        let (_, b) = build_from_hashes(&digests(&[1, 2, 4]));
        assert_ne!(a, b);
    }

    #[test]
    fn proof_verifies_for_every_inserted_key() {
        let hashes = digests(&[10, 20, 30, 40, 50]);
        let (trie, root) = build_from_hashes(&hashes);

        for h in &hashes {
            let proof = trie.generate_proof(h);
            assert!(verify_proof(&root, h, h, &proof));
        }
    }

    #[test]
    fn proof_rejects_wrong_value() {
        let hashes = digests(&[10, 20, 30]);
        let (trie, root) = build_from_hashes(&hashes);

        let proof = trie.generate_proof(&hashes[0]);
        let wrong = digests(&[99])[0];
        assert!(!verify_proof(&root, &hashes[0], &wrong, &proof));
    }

    #[test]
    fn proof_rejects_any_flipped_hash() {
        let hashes = digests(&[10, 20, 30, 40]);
        let (trie, root) = build_from_hashes(&hashes);

        let proof = trie.generate_proof(&hashes[0]);
        for i in 0..proof.len() {
            let mut tampered = proof.clone();
            tampered[i][0] ^= 0x01;
            assert!(
                !verify_proof(&root, &hashes[0], &hashes[0], &tampered),
                "flipping proof entry {i} must fail verification"
            );
        }
    }

    #[test]
    fn absent_key_proof_does_not_verify() {
        let hashes = digests(&[10, 20, 30]);
        let (trie, root) = build_from_hashes(&hashes);

        let absent = digests(&[77])[0];
        let proof = trie.generate_proof(&absent);
        assert!(!verify_proof(&root, &absent, &absent, &proof));
    }

    proptest! {
        #[test]
        fn root_is_invariant_under_permutation(
            seeds in proptest::collection::hash_set(any::<u8>(), 1..24),
            rotation in 0usize..24,
        ) {
            let seeds: Vec<u8> = seeds.into_iter().collect();
            let hashes = digests(&seeds);
            let (_, base) = build_from_hashes(&hashes);

            let mut rotated = hashes.clone();
            let rotation = rotation % rotated.len();
            rotated.rotate_left(rotation);
            let (_, rotated_root) = build_from_hashes(&rotated);
            prop_assert_eq!(base, rotated_root);

            let mut reversed = hashes;
            reversed.reverse();
            let (_, reversed_root) = build_from_hashes(&reversed);
            prop_assert_eq!(base, reversed_root);
        }

        #[test]
        fn every_member_has_a_verifying_proof(
            seeds in proptest::collection::hash_set(any::<u8>(), 1..16),
        ) {
            let seeds: Vec<u8> = seeds.into_iter().collect();
            let hashes = digests(&seeds);
            let (trie, root) = build_from_hashes(&hashes);

            for h in &hashes {
                let proof = trie.generate_proof(h);
                prop_assert!(verify_proof(&root, h, h, &proof));
            }
        }
    }
}
