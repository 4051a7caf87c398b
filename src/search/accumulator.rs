use crate::party::error::{MpcError, MpcResult};
use crate::share::{BitShare, HasZero, XorShare};

/// An XOR-shared index built one bit at a time, most significant bit first.
///
/// Appending is local: the accumulated value is shifted left and the new bit becomes the
/// lowest bit.
#[derive(Clone, Copy, Debug)]
pub struct IndexAccumulator {
    value: XorShare,
    len: u32,
    capacity: u32,
}

impl IndexAccumulator {
    /// An empty accumulator for indices of at most `capacity` bits.
    pub fn new(capacity: u32) -> Self {
        debug_assert!(capacity <= u64::BITS);
        Self {
            value: XorShare::ZERO,
            len: 0,
            capacity,
        }
    }

    /// Appends `bit` as the new lowest bit. Fails if `capacity` bits were already appended.
    pub fn append(self, bit: BitShare) -> MpcResult<Self> {
        if self.len >= self.capacity {
            return Err(MpcError::InvalidParameters(format!(
                "index accumulator is full ({} bits)",
                self.capacity
            )));
        }
        Ok(Self {
            value: (self.value << 1) ^ XorShare::from_bit(bit),
            len: self.len + 1,
            capacity: self.capacity,
        })
    }

    /// Share of the bits appended so far.
    pub fn current(&self) -> XorShare {
        self.value
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn materialize(self) -> XorShare {
        self.value
    }
}
