//! Compound field values: bit sets and grid-unique ids.

use std::fmt;

use uuid::Uuid;

const WORD_BITS: usize = u64::BITS as usize;

/// A growable set of bit indices, framed as its 64-bit words.
///
/// Trailing zero words are never kept, so two sets holding the same bits
/// compare equal regardless of how they were built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from little-endian words: bit `i` of word `w` is index
    /// `w * 64 + i`.
    pub fn from_words(words: impl Into<Vec<u64>>) -> Self {
        let mut set = Self {
            words: words.into(),
        };
        set.trim();
        set
    }

    /// Returns the words, without trailing zero words.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Sets `bit`, returning `true` if it was not already set.
    pub fn insert(&mut self, bit: usize) -> bool {
        let (word, mask) = locate(bit);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    /// Clears `bit`, returning `true` if it was set.
    pub fn remove(&mut self, bit: usize) -> bool {
        let (word, mask) = locate(bit);
        let Some(slot) = self.words.get_mut(word) else {
            return false;
        };
        let was_set = *slot & mask != 0;
        *slot &= !mask;
        self.trim();
        was_set
    }

    /// Returns `true` if `bit` is set.
    pub fn contains(&self, bit: usize) -> bool {
        let (word, mask) = locate(bit);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Returns the number of set bits.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Iterates the set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| index * WORD_BITS + bit)
        })
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

fn locate(bit: usize) -> (usize, u64) {
    (bit / WORD_BITS, 1u64 << (bit % WORD_BITS))
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<usize> for BitSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for bit in iter {
            self.insert(bit);
        }
    }
}

/// An id unique across the grid: the UUID of the node that generated it and
/// a counter local to that node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridUuid {
    global_id: Uuid,
    local_id: i64,
}

impl GridUuid {
    /// Creates an id from its two parts.
    pub fn new(global_id: Uuid, local_id: i64) -> Self {
        Self {
            global_id,
            local_id,
        }
    }

    /// Returns the generating node's UUID.
    pub fn global_id(&self) -> Uuid {
        self.global_id
    }

    /// Returns the node-local counter.
    pub fn local_id(&self) -> i64 {
        self.local_id
    }
}

impl fmt::Display for GridUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}-{}", self.local_id, self.global_id)
    }
}
