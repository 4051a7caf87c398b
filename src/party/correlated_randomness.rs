//! Common randomness between the two parties and the correlated randomness consumed by the online protocols.
//!
//! Correlated randomness is produced by a [TrustedDealer] and handed to each party as a
//! [PreprocessedStore]. The online protocols only ever take items out of the store.
use std::collections::{HashMap, VecDeque};

use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::network::CommChannel;
use crate::party::commitment;
use crate::party::error::{MpcError, MpcResult};
use crate::share::{encode_checked, ArithShare, XorShare};

const CR_SEC_PARAM: usize = 128 / 8;

/// Randomness source shared between both parties setup via a shared, short, random seed to a local RNG
pub struct SharedRng(ChaCha20Rng);

impl SharedRng {
    pub fn setup_pairwise<LocalRng: Rng + CryptoRng>(
        rng: &mut LocalRng,
        channel: &mut CommChannel,
        my_id: usize,
        to_id: usize,
    ) -> MpcResult<Self> {
        // create random seed part
        let mut seed = [0u8; CR_SEC_PARAM];
        rng.fill_bytes(&mut seed);
        // commit to it
        let commitment = commitment::commit(rng, &seed);
        let mut other_commit = [0u8; commitment::COMMITMENT_SIZE];
        let mut other_seed = [0u8; CR_SEC_PARAM];
        if my_id < to_id {
            // send my commitment first
            channel.write(&commitment)?;
            // then read the other
            channel.read(&mut other_commit)?;
            // send my seed
            channel.write(&seed)?;
            // then read the other seed
            channel.read(&mut other_seed)?;
        } else {
            // first read the other commitment
            channel.read(&mut other_commit)?;
            // then send my commitment
            channel.write(&commitment)?;
            // first read the other seed
            channel.read(&mut other_seed)?;
            // then send my seed
            channel.write(&seed)?;
        }

        commitment::open(&other_commit, &other_seed)?;
        let mut common_seed = [0u8; 32];
        for i in 0..CR_SEC_PARAM {
            common_seed[i] = seed[i] ^ other_seed[i];
        }
        Ok(Self(ChaCha20Rng::from_seed(common_seed)))
    }
}

impl AsMut<ChaCha20Rng> for SharedRng {
    fn as_mut(&mut self) -> &mut ChaCha20Rng {
        &mut self.0
    }
}

/// Shares of `a`, `b` and `c = a & b` for 64 parallel AND gates.
#[derive(Clone, Copy, Debug)]
pub struct BitTriple {
    pub a: XorShare,
    pub b: XorShare,
    pub c: XorShare,
}

/// Shares of `a`, `b` and `c = a * b` in the ring.
#[derive(Clone, Copy, Debug)]
pub struct RingTriple {
    pub a: ArithShare,
    pub b: ArithShare,
    pub c: ArithShare,
}

/// How the index of an oblivious read is shared, and thus how the random mask is shared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// `delta` is a uniformly random ring element, shared additively.
    Arith,
    /// `delta` is uniformly random in `[0, width)`, shared by XOR.
    Xor,
}

/// A party's share of the random mask of a [OneHotTuple].
#[derive(Clone, Copy, Debug)]
pub enum IndexMask {
    Arith(ArithShare),
    Xor(XorShare),
}

/// Shares of a random mask `delta` and of the unit vector `e_(delta mod width)`.
#[derive(Clone, Debug)]
pub struct OneHotTuple {
    pub mask: IndexMask,
    pub unit: Vec<ArithShare>,
}

/// The amount of correlated randomness a computation consumes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorrelationDemand {
    pub bit_triples: usize,
    pub ring_triples: usize,
    /// One entry per oblivious read, in the order of consumption.
    pub one_hot: Vec<(usize, MaskKind)>,
}

impl CorrelationDemand {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bit_triples == 0 && self.ring_triples == 0 && self.one_hot.is_empty()
    }

    pub fn add(&mut self, other: &CorrelationDemand) {
        self.bit_triples += other.bit_triples;
        self.ring_triples += other.ring_triples;
        self.one_hot.extend_from_slice(&other.one_hot);
    }

    /// Demand of `n` independent repetitions.
    pub fn repeat(&self, n: usize) -> Self {
        let mut total = Self::empty();
        for _ in 0..n {
            total.add(self);
        }
        total
    }
}

/// Correlated randomness of one party.
#[derive(Default)]
pub struct PreprocessedStore {
    bit_triples: VecDeque<BitTriple>,
    ring_triples: VecDeque<RingTriple>,
    one_hot: HashMap<(usize, MaskKind), VecDeque<OneHotTuple>>,
}

impl PreprocessedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the items of `other` to this store.
    pub fn extend(&mut self, other: PreprocessedStore) {
        self.bit_triples.extend(other.bit_triples);
        self.ring_triples.extend(other.ring_triples);
        for (key, tuples) in other.one_hot {
            self.one_hot.entry(key).or_default().extend(tuples);
        }
    }

    pub fn bit_triples_left(&self) -> usize {
        self.bit_triples.len()
    }

    pub fn ring_triples_left(&self) -> usize {
        self.ring_triples.len()
    }

    pub fn one_hot_left(&self, width: usize, kind: MaskKind) -> usize {
        self.one_hot.get(&(width, kind)).map_or(0, |q| q.len())
    }

    pub fn is_empty(&self) -> bool {
        self.bit_triples.is_empty()
            && self.ring_triples.is_empty()
            && self.one_hot.values().all(|q| q.is_empty())
    }

    pub fn take_bit_triples(&mut self, n: usize) -> MpcResult<Vec<BitTriple>> {
        if self.bit_triples.len() < n {
            return Err(MpcError::InsufficientPreprocessing(format!(
                "{} bit triples requested, {} left",
                n,
                self.bit_triples.len()
            )));
        }
        Ok(self.bit_triples.drain(..n).collect())
    }

    pub fn take_ring_triples(&mut self, n: usize) -> MpcResult<Vec<RingTriple>> {
        if self.ring_triples.len() < n {
            return Err(MpcError::InsufficientPreprocessing(format!(
                "{} ring triples requested, {} left",
                n,
                self.ring_triples.len()
            )));
        }
        Ok(self.ring_triples.drain(..n).collect())
    }

    pub fn take_one_hot(&mut self, width: usize, kind: MaskKind) -> MpcResult<OneHotTuple> {
        self.one_hot
            .get_mut(&(width, kind))
            .and_then(|q| q.pop_front())
            .ok_or_else(|| {
                MpcError::InsufficientPreprocessing(format!(
                    "no one-hot tuple of width {} ({:?}) left",
                    width, kind
                ))
            })
    }
}

/// Generates correlated randomness and input shares for both parties.
///
/// The dealer must be run by a party that takes no part in the computation. If both computing
/// parties derive the dealer from a common seed (as the benchmark does) there is no privacy.
pub struct TrustedDealer {
    rng: ChaCha20Rng,
}

impl TrustedDealer {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    fn split_arith(&mut self, value: u64) -> (ArithShare, ArithShare) {
        let r = self.rng.next_u64();
        (ArithShare(r), ArithShare(value.wrapping_sub(r)))
    }

    fn split_xor(&mut self, value: u64) -> (XorShare, XorShare) {
        let r = self.rng.next_u64();
        (XorShare(r), XorShare(value ^ r))
    }

    fn bit_triple(&mut self) -> (BitTriple, BitTriple) {
        let a = self.rng.next_u64();
        let b = self.rng.next_u64();
        let (a0, a1) = self.split_xor(a);
        let (b0, b1) = self.split_xor(b);
        let (c0, c1) = self.split_xor(a & b);
        (
            BitTriple { a: a0, b: b0, c: c0 },
            BitTriple { a: a1, b: b1, c: c1 },
        )
    }

    fn ring_triple(&mut self) -> (RingTriple, RingTriple) {
        let a = self.rng.next_u64();
        let b = self.rng.next_u64();
        let (a0, a1) = self.split_arith(a);
        let (b0, b1) = self.split_arith(b);
        let (c0, c1) = self.split_arith(a.wrapping_mul(b));
        (
            RingTriple { a: a0, b: b0, c: c0 },
            RingTriple { a: a1, b: b1, c: c1 },
        )
    }

    fn one_hot(&mut self, width: usize, kind: MaskKind) -> (OneHotTuple, OneHotTuple) {
        debug_assert!(width.is_power_of_two());
        let mask_bits = width as u64 - 1;
        let (delta, mask0, mask1) = match kind {
            MaskKind::Arith => {
                let delta = self.rng.next_u64();
                let (m0, m1) = self.split_arith(delta);
                (delta, IndexMask::Arith(m0), IndexMask::Arith(m1))
            }
            MaskKind::Xor => {
                let delta = self.rng.next_u64() & mask_bits;
                let (m0, m1) = self.split_xor(delta);
                (delta, IndexMask::Xor(m0), IndexMask::Xor(m1))
            }
        };
        let hot = (delta & mask_bits) as usize;
        let (unit0, unit1): (Vec<_>, Vec<_>) = (0..width)
            .map(|j| self.split_arith((j == hot) as u64))
            .unzip();
        (
            OneHotTuple { mask: mask0, unit: unit0 },
            OneHotTuple { mask: mask1, unit: unit1 },
        )
    }

    /// Generates the correlated randomness described by `demand` for party 0 and party 1.
    pub fn deal(&mut self, demand: &CorrelationDemand) -> (PreprocessedStore, PreprocessedStore) {
        let mut p0 = PreprocessedStore::new();
        let mut p1 = PreprocessedStore::new();
        for _ in 0..demand.bit_triples {
            let (t0, t1) = self.bit_triple();
            p0.bit_triples.push_back(t0);
            p1.bit_triples.push_back(t1);
        }
        for _ in 0..demand.ring_triples {
            let (t0, t1) = self.ring_triple();
            p0.ring_triples.push_back(t0);
            p1.ring_triples.push_back(t1);
        }
        for &(width, kind) in &demand.one_hot {
            let (t0, t1) = self.one_hot(width, kind);
            p0.one_hot.entry((width, kind)).or_default().push_back(t0);
            p1.one_hot.entry((width, kind)).or_default().push_back(t1);
        }
        (p0, p1)
    }

    /// Secret-shares `values` on behalf of a data owner.
    pub fn share_values(&mut self, values: &[i64]) -> MpcResult<(Vec<ArithShare>, Vec<ArithShare>)> {
        let encoded = values
            .iter()
            .map(|v| encode_checked(*v))
            .collect::<MpcResult<Vec<_>>>()?;
        Ok(encoded.into_iter().map(|v| self.split_arith(v)).unzip())
    }
}
