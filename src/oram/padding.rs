use crate::oram::{ArrayView, SharedArray};
use crate::party::Role;
use crate::share::{as_local_share, encode, ArithShare, PAD_VALUE};

/// Smallest power of two strictly greater than `size`.
pub fn padded_size(size: usize) -> usize {
    if size == 0 {
        1
    } else {
        (size + 1).next_power_of_two()
    }
}

/// Number of halving rounds over an array of `size` elements, `log2(padded_size(size))`.
pub fn search_depth(size: usize) -> u32 {
    padded_size(size).trailing_zeros()
}

/// A [SharedArray] extended to [padded_size] positions.
///
/// Positions past the end of the array read as shares of the public [PAD_VALUE].
pub struct PaddedView<'a> {
    array: &'a SharedArray,
    pad: ArithShare,
    width: usize,
}

impl<'a> PaddedView<'a> {
    pub fn new(array: &'a SharedArray, role: Role) -> Self {
        Self {
            array,
            pad: as_local_share(encode(PAD_VALUE), role),
            width: padded_size(array.len()),
        }
    }

    pub fn depth(&self) -> u32 {
        self.width.trailing_zeros()
    }
}

impl ArrayView for PaddedView<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn share_at(&self, pos: usize) -> ArithShare {
        debug_assert!(pos < self.width);
        self.array.get(pos).unwrap_or(self.pad)
    }
}
