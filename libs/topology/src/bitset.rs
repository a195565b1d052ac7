//! Block-addressed bit vector used to carry abstract CPU sets.
//!
//! Bit `i` lives in block `i / 64` at position `i % 64`, block 0 holding the
//! least-significant bits. The textual form is a `0x`-prefixed big-endian hex
//! number, e.g. `{0, 65}` renders as `0x20000000000000001` and the empty set as `0x`.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::TopologyError;

const BLOCK_BITS: usize = u64::BITS as usize;
const NIBBLES_PER_BLOCK: usize = BLOCK_BITS / 4;
const HEX_PREFIX: &str = "0x";

/// A finite set of small non-negative integers.
///
/// Trailing all-zero blocks are never stored, so two bitsets compare equal
/// exactly when they hold the same indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bitset {
    blocks: Vec<u64>,
}

impl Bitset {
    /// Creates an empty bitset with no blocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bitset from raw blocks, least-significant block first.
    pub fn from_blocks(blocks: Vec<u64>) -> Self {
        let mut bitset = Self { blocks };
        bitset.trim();
        bitset
    }

    /// Decodes the hex form, see [`FromStr`].
    pub fn parse_hex(s: &str) -> Result<Self, TopologyError> {
        s.parse()
    }

    /// Renders the canonical hex form: lowercase, `0x`-prefixed, no leading zeros.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    pub fn blocks(&self) -> &[u64] {
        &self.blocks
    }

    /// Sets bit `index`, growing the block sequence as needed.
    pub fn insert(&mut self, index: usize) {
        let block = index / BLOCK_BITS;
        if block >= self.blocks.len() {
            self.blocks.resize(block + 1, 0);
        }
        self.blocks[block] |= 1u64 << (index % BLOCK_BITS);
    }

    pub fn contains(&self, index: usize) -> bool {
        self.blocks
            .get(index / BLOCK_BITS)
            .is_some_and(|block| block & (1u64 << (index % BLOCK_BITS)) != 0)
    }

    /// Number of set bits.
    pub fn len(&self) -> usize {
        self.blocks
            .iter()
            .map(|block| block.count_ones() as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn union(&self, other: &Bitset) -> Bitset {
        let (longer, shorter) = if self.blocks.len() >= other.blocks.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut blocks = longer.blocks.clone();
        for (block, extra) in blocks.iter_mut().zip(&shorter.blocks) {
            *block |= extra;
        }
        Bitset { blocks }
    }

    /// Iterates set-bit indices in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            blocks: &self.blocks,
            block: 0,
            word: self.blocks.first().copied().unwrap_or(0),
        }
    }

    fn trim(&mut self) {
        while self.blocks.last() == Some(&0) {
            self.blocks.pop();
        }
    }
}

/// Ascending iterator over the set bits of a [`Bitset`].
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    blocks: &'a [u64],
    block: usize,
    word: u64,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.word == 0 {
            self.block += 1;
            self.word = *self.blocks.get(self.block)?;
        }
        let bit = self.word.trailing_zeros() as usize;
        // clear lowest set bit
        self.word &= self.word - 1;
        Some(self.block * BLOCK_BITS + bit)
    }
}

impl<'a> IntoIterator for &'a Bitset {
    type Item = usize;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl FromIterator<usize> for Bitset {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut bitset = Bitset::new();
        bitset.extend(iter);
        bitset
    }
}

impl Extend<usize> for Bitset {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for index in iter {
            self.insert(index);
        }
    }
}

impl BitOr for &Bitset {
    type Output = Bitset;

    fn bitor(self, rhs: &Bitset) -> Bitset {
        self.union(rhs)
    }
}

impl FromStr for Bitset {
    type Err = TopologyError;

    /// Parses an optionally `0x`-prefixed hex number of any width.
    ///
    /// A bare `0x` is the empty set. Digits may be upper or lower case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(HEX_PREFIX).unwrap_or(s);
        let prefix_len = s.len() - digits.len();
        let width = digits.len();

        let mut blocks = vec![0u64; width.div_ceil(NIBBLES_PER_BLOCK)];
        for (idx, ch) in digits.char_indices() {
            let nibble = ch.to_digit(16).ok_or_else(|| TopologyError::InvalidHex {
                input: s.to_string(),
                found: ch,
                offset: prefix_len + idx,
            })?;
            // position counted from the least-significant digit
            let pos = width - 1 - idx;
            blocks[pos / NIBBLES_PER_BLOCK] |=
                u64::from(nibble) << (4 * (pos % NIBBLES_PER_BLOCK));
        }
        Ok(Bitset::from_blocks(blocks))
    }
}

impl fmt::Display for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(HEX_PREFIX)?;
        let mut blocks = self.blocks.iter().rev();
        if let Some(top) = blocks.next() {
            write!(f, "{top:x}")?;
        }
        for block in blocks {
            write!(f, "{block:016x}")?;
        }
        Ok(())
    }
}

impl Serialize for Bitset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bitset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
