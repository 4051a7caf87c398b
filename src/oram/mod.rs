//! Read-only oblivious arrays of additive shares.
//!
//! An [ArrayView] exposes a public width and the local share at every public position.
//! [read_at_arith] and [read_at_xor] return a fresh share of the value at a secret index
//! by opening the index masked with the random offset of a one-hot tuple and taking the
//! inner product of the unit vector with the accordingly permuted view.
//! Neither party learns the index from the opened value.
mod padding;

pub use padding::{padded_size, search_depth, PaddedView};

#[cfg(feature = "verbose-timing")]
use {crate::party::PARTY_TIMER, std::time::Instant};

use rayon::prelude::*;

use crate::mul::{inner_product, open_arith, open_xor};
use crate::party::correlated_randomness::{IndexMask, MaskKind, OneHotTuple};
use crate::party::error::{MpcError, MpcResult};
use crate::party::{MainParty, Role};
use crate::share::{ArithShare, XorShare};

/// Below this width the permuted view is built on the calling thread.
const PAR_THRESHOLD: usize = 1 << 12;

/// A read-only array of shares with a public width.
pub trait ArrayView: Sync {
    fn width(&self) -> usize;

    /// The local share at the public position `pos < width()`.
    fn share_at(&self, pos: usize) -> ArithShare;
}

/// One party's shares of a sorted array.
#[derive(Clone, Debug, Default)]
pub struct SharedArray {
    shares: Vec<ArithShare>,
}

impl SharedArray {
    pub fn from_shares(shares: Vec<ArithShare>) -> Self {
        Self { shares }
    }

    /// Secret-shares `len` values held by `owner`; only the owner passes `values`.
    pub fn from_plain(
        party: &mut MainParty,
        owner: Role,
        values: Option<&[i64]>,
        len: usize,
    ) -> MpcResult<Self> {
        party.input_arith(owner, values, len).map(Self::from_shares)
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<ArithShare> {
        self.shares.get(pos).copied()
    }

    pub fn shares(&self) -> &[ArithShare] {
        &self.shares
    }
}

impl ArrayView for SharedArray {
    fn width(&self) -> usize {
        self.shares.len()
    }

    fn share_at(&self, pos: usize) -> ArithShare {
        self.shares[pos]
    }
}

/// The positions `offset + j * stride` for `j < extent` of an inner view.
pub struct StridedView<'a, V: ArrayView> {
    inner: &'a V,
    offset: usize,
    stride: usize,
    extent: usize,
}

impl<'a, V: ArrayView> StridedView<'a, V> {
    pub fn new(inner: &'a V, offset: usize, stride: usize, extent: usize) -> MpcResult<Self> {
        let last = extent
            .checked_sub(1)
            .and_then(|j| j.checked_mul(stride))
            .and_then(|x| x.checked_add(offset));
        match last {
            Some(last) if stride > 0 && last < inner.width() => Ok(Self {
                inner,
                offset,
                stride,
                extent,
            }),
            _ => Err(MpcError::InvalidParameters(format!(
                "strided view (offset {}, stride {}, extent {}) exceeds width {}",
                offset,
                stride,
                extent,
                inner.width()
            ))),
        }
    }
}

impl<V: ArrayView> ArrayView for StridedView<'_, V> {
    fn width(&self) -> usize {
        self.extent
    }

    fn share_at(&self, pos: usize) -> ArithShare {
        self.inner.share_at(self.offset + pos * self.stride)
    }
}

/// The local share at a public position; no communication.
pub fn read_public<V: ArrayView>(view: &V, pos: usize) -> MpcResult<ArithShare> {
    if pos >= view.width() {
        return Err(MpcError::InvalidParameters(format!(
            "position {} out of bounds for width {}",
            pos,
            view.width()
        )));
    }
    Ok(view.share_at(pos))
}

fn check_width<V: ArrayView>(view: &V) -> MpcResult<usize> {
    let width = view.width();
    if !width.is_power_of_two() {
        return Err(MpcError::InvalidParameters(format!(
            "oblivious read needs a power-of-two width, got {}",
            width
        )));
    }
    Ok(width)
}

/// Shares of `view[permute(j)]` for `j < width`.
fn permuted<V, F>(party: &MainParty, view: &V, permute: F) -> Vec<ArithShare>
where
    V: ArrayView,
    F: Fn(usize) -> usize + Sync,
{
    let width = view.width();
    if party.has_multi_threading() && width >= PAR_THRESHOLD {
        party.run_in_threadpool(|| {
            (0..width)
                .into_par_iter()
                .map(|j| view.share_at(permute(j)))
                .collect()
        })
    } else {
        (0..width).map(|j| view.share_at(permute(j))).collect()
    }
}

fn finish_read<V: ArrayView>(
    party: &mut MainParty,
    view: &V,
    tuple: OneHotTuple,
    permute: impl Fn(usize) -> usize + Sync,
) -> MpcResult<ArithShare> {
    let values = permuted(party, view, permute);
    let res = inner_product(party, &tuple.unit, &values)?;
    party.record_read(view.width());
    Ok(res)
}

/// Reads the value at the additively shared index `index < width`.
pub fn read_at_arith<V: ArrayView>(
    party: &mut MainParty,
    view: &V,
    index: ArithShare,
) -> MpcResult<ArithShare> {
    #[cfg(feature = "verbose-timing")]
    let start = Instant::now();
    let width = check_width(view)?;
    let tuple = party.correlations_mut().take_one_hot(width, MaskKind::Arith)?;
    let delta = match tuple.mask {
        IndexMask::Arith(delta) => delta,
        IndexMask::Xor(_) => unreachable!("one-hot tuples are stored by mask kind"),
    };
    let opened = open_arith(party, &[index - delta])?;
    let shift = opened[0] as usize & (width - 1);
    let res = finish_read(party, view, tuple, |j| (j + shift) & (width - 1))?;
    #[cfg(feature = "verbose-timing")]
    {
        if let Ok(mut timer) = PARTY_TIMER.lock() {
            timer.report_time("read", start.elapsed());
        }
    }
    Ok(res)
}

/// Reads the value at the XOR shared index `index < width`.
pub fn read_at_xor<V: ArrayView>(
    party: &mut MainParty,
    view: &V,
    index: XorShare,
) -> MpcResult<ArithShare> {
    #[cfg(feature = "verbose-timing")]
    let start = Instant::now();
    let width = check_width(view)?;
    let tuple = party.correlations_mut().take_one_hot(width, MaskKind::Xor)?;
    let delta = match tuple.mask {
        IndexMask::Xor(delta) => delta,
        IndexMask::Arith(_) => unreachable!("one-hot tuples are stored by mask kind"),
    };
    let opened = open_xor(party, &[index ^ delta])?;
    let flip = opened[0] as usize & (width - 1);
    let res = finish_read(party, view, tuple, |j| j ^ flip)?;
    #[cfg(feature = "verbose-timing")]
    {
        if let Ok(mut timer) = PARTY_TIMER.lock() {
            timer.report_time("read", start.elapsed());
        }
    }
    Ok(res)
}
