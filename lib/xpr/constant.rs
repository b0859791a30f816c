//! An `XConstant` holds a single machine-word value.
//!
//! Values up to 64 bits are supported. All arithmetic over constants is
//! modulo `2^bits`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A constant value.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct XConstant {
    value: u64,
    bits: usize,
}

impl XConstant {
    /// Create a new `XConstant` with the given value and bitness.
    pub fn new(value: u64, bits: usize) -> XConstant {
        XConstant { value, bits }
    }

    /// A 32-bit machine word.
    pub fn word(value: u64) -> XConstant {
        XConstant::new(value, 32)
    }

    /// Get the value of this `XConstant`, truncated to its bitness.
    pub fn value(&self) -> u64 {
        if self.bits == 64 {
            self.value
        } else {
            self.value & ((1 << self.bits) - 1)
        }
    }

    /// Get the number of bits for this `XConstant`.
    pub fn bits(&self) -> usize {
        self.bits
    }
}

impl fmt::Display for XConstant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:x}", self.value())
    }
}
