//! # Bounded Bitmaps
//!
//! Offset-checked bitsets for the status descriptor. Out-of-range indices
//! are ignored on `set` and read as `false` on `test`, so callers never do
//! mask or shift arithmetic themselves.

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

/// Bitset with a fixed number of bits, stored LSB-first in whole bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowBitmap {
    bits: BitVec<u8, Lsb0>,
}

impl WindowBitmap {
    /// All-clear bitmap with `len` bits.
    pub fn new(len: usize) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; len],
        }
    }

    /// Rebuild from wire bytes; `bytes.len() * 8` bits.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bits: BitVec::from_slice(bytes),
        }
    }

    /// Set bit `index`. Returns false (and does nothing) when out of range.
    pub fn set(&mut self, index: usize) -> bool {
        if index >= self.bits.len() {
            return false;
        }
        self.bits.set(index, true);
        true
    }

    /// Test bit `index`; out-of-range reads as false.
    pub fn test(&self, index: usize) -> bool {
        self.bits.get(index).map(|b| *b).unwrap_or(false)
    }

    /// Number of addressable bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Backing bytes as laid out on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    /// Wire size in bytes.
    pub fn byte_len(&self) -> usize {
        self.bits.len().div_ceil(8)
    }
}

/// Bitmap of request slots in a batch that are missing (one bit per big
/// request, at most 64 per pre-prepare).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrMap(u64);

impl BrMap {
    /// Number of request slots a map can describe.
    pub const BITS: usize = 64;

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Mark slot `index`. Out-of-range slots are ignored.
    pub fn set(&mut self, index: usize) {
        if index < Self::BITS {
            self.0 |= 1u64 << index;
        }
    }

    pub fn is_set(&self, index: usize) -> bool {
        index < Self::BITS && self.0 & (1u64 << index) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}
