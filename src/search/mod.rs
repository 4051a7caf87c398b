//! Oblivious lower-bound search over a secret-shared sorted array.
//!
//! Both variants run `search_depth(len)` rounds of one oblivious read and one comparison each,
//! and return a share of the smallest index whose value is at least the target (the array
//! length if there is none).
//!
//! - [basic_search] reads over the whole padded array in every round and keeps the index
//!   as an additive share.
//! - [strided_search] probes the public midpoint first, then reads only the midpoints of the
//!   still reachable windows (widths 2, 4, ..., P/2). The index is XOR shared and built bit by
//!   bit in an [IndexAccumulator].
//!
//! The correlated randomness consumed by a search only depends on the variant and the array
//! length, see [search_demand].
mod accumulator;
mod basic;
mod strided;

pub use accumulator::IndexAccumulator;
pub use basic::basic_search;
pub use strided::strided_search;

use crate::compare::LT_AND_WORDS;
use crate::mul::{open_arith, open_xor};
use crate::oram::{padded_size, search_depth, SharedArray};
use crate::party::correlated_randomness::{CorrelationDemand, MaskKind};
use crate::party::error::MpcResult;
use crate::party::MainParty;
use crate::share::{ArithShare, XorShare};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SearchVariant {
    Basic,
    Strided,
}

/// A share of a search result, in the representation of the variant that computed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchIndex {
    Arith(ArithShare),
    Xor(XorShare),
}

impl SearchIndex {
    /// Reveals the index to both parties.
    pub fn open(self, party: &mut MainParty) -> MpcResult<u64> {
        let opened = match self {
            SearchIndex::Arith(share) => open_arith(party, &[share])?,
            SearchIndex::Xor(share) => open_xor(party, &[share])?,
        };
        Ok(opened[0])
    }
}

/// Runs the search of the given variant.
pub fn run_search(
    party: &mut MainParty,
    variant: SearchVariant,
    array: &SharedArray,
    target: ArithShare,
) -> MpcResult<SearchIndex> {
    match variant {
        SearchVariant::Basic => basic_search(party, array, target).map(SearchIndex::Arith),
        SearchVariant::Strided => strided_search(party, array, target).map(SearchIndex::Xor),
    }
}

/// The window of a strided round with `d` of `depth` rounds remaining, as
/// `(offset, stride, extent)` into the padded array.
///
/// Window `k` covers positions `[k * 2^d, (k + 1) * 2^d)`; its probe is the last position of
/// its left half.
pub fn strided_window(depth: u32, d: u32) -> (usize, usize, usize) {
    debug_assert!(0 < d && d < depth);
    ((1 << (d - 1)) - 1, 1 << d, 1 << (depth - d))
}

/// Correlated randomness consumed by [basic_search] on `size` elements.
pub fn basic_search_demand(size: usize) -> CorrelationDemand {
    if size == 0 {
        return CorrelationDemand::empty();
    }
    let width = padded_size(size);
    let round = CorrelationDemand {
        bit_triples: LT_AND_WORDS,
        // inner product of the read, then bit-to-arith of the comparison bit
        ring_triples: width + 1,
        one_hot: vec![(width, MaskKind::Arith)],
    };
    round.repeat(search_depth(size) as usize)
}

/// Correlated randomness consumed by [strided_search] on `size` elements.
pub fn strided_search_demand(size: usize) -> CorrelationDemand {
    if size == 0 {
        return CorrelationDemand::empty();
    }
    let depth = search_depth(size);
    let one_hot: Vec<(usize, MaskKind)> = (1..depth)
        .rev()
        .map(|d| (strided_window(depth, d).2, MaskKind::Xor))
        .collect();
    CorrelationDemand {
        bit_triples: depth as usize * LT_AND_WORDS,
        ring_triples: one_hot.iter().map(|(width, _)| width).sum(),
        one_hot,
    }
}

pub fn search_demand(variant: SearchVariant, size: usize) -> CorrelationDemand {
    match variant {
        SearchVariant::Basic => basic_search_demand(size),
        SearchVariant::Strided => strided_search_demand(size),
    }
}
