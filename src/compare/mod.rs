//! Secure comparison of additively shared differences against zero.
//!
//! The difference `x = x0 + x1` is converted to XOR-shared bits by adding the two shares in a
//! parallel-prefix (Kogge-Stone) adder over packed 64-bit words. The sign bit of the sum is
//! `x < 0`. For `x == 0` the complement of the sum is AND-reduced to a single bit.
//!
//! All values passed to this module must be differences of admissible values, so that the
//! sign bit of the ring element equals the sign of the difference.
#[cfg(feature = "verbose-timing")]
use {crate::party::PARTY_TIMER, std::time::Instant};

use itertools::izip;

use crate::mul::and;
use crate::party::error::MpcResult;
use crate::party::{MainParty, Role};
use crate::share::{ArithShare, BitShare, HasZero, XorShare};

/// AND words consumed per value by [less_than_batch].
pub const LT_AND_WORDS: usize = 12;
/// Additional AND words consumed per value by [compare_batch].
pub const EQ_AND_WORDS: usize = 6;

const PREFIX_SHIFTS: [u32; 6] = [1, 2, 4, 8, 16, 32];

/// Shares of `x < 0`, `x == 0` and `x > 0`. Exactly one of the three is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComparisonResult {
    pub lt: BitShare,
    pub eq: BitShare,
    pub gt: BitShare,
}

/// Converts additive shares into XOR shares of the same ring elements.
pub fn arith_to_bin(party: &mut MainParty, values: &[ArithShare]) -> MpcResult<Vec<XorShare>> {
    let role = party.role();
    let n = values.len();
    // first summand is P0's share, second summand is P1's share
    let (lhs, rhs): (Vec<XorShare>, Vec<XorShare>) = values
        .iter()
        .map(|v| match role {
            Role::P0 => (XorShare(v.0), XorShare::ZERO),
            Role::P1 => (XorShare::ZERO, XorShare(v.0)),
        })
        .unzip();

    let propagate: Vec<XorShare> = lhs.iter().zip(&rhs).map(|(a, b)| *a ^ *b).collect();
    let mut g = and(party, &lhs, &rhs)?;
    let mut p = propagate.clone();

    for (level, shift) in PREFIX_SHIFTS.iter().enumerate() {
        let last = level == PREFIX_SHIFTS.len() - 1;
        let mut x = p.clone();
        let mut y: Vec<XorShare> = g.iter().map(|g| *g << *shift).collect();
        if !last {
            x.extend_from_slice(&p);
            y.extend(p.iter().map(|p| *p << *shift));
        }
        let products = and(party, &x, &y)?;
        for (g, prod) in g.iter_mut().zip(&products[..n]) {
            *g ^= *prod;
        }
        if !last {
            p.copy_from_slice(&products[n..]);
        }
    }

    // g holds the carry out of every prefix
    Ok(izip!(propagate, g).map(|(p, g)| p ^ (g << 1)).collect())
}

/// Returns shares of `x < 0` for every shared difference `x`.
pub fn less_than_batch(party: &mut MainParty, diffs: &[ArithShare]) -> MpcResult<Vec<BitShare>> {
    #[cfg(feature = "verbose-timing")]
    let start = Instant::now();
    let bits = arith_to_bin(party, diffs)?;
    party.record_comparisons(diffs.len());
    #[cfg(feature = "verbose-timing")]
    {
        if let Ok(mut timer) = PARTY_TIMER.lock() {
            timer.report_time("less_than", start.elapsed());
        }
    }
    Ok(bits.into_iter().map(|b| b.bit(63)).collect())
}

/// Returns shares of the full comparison of every shared difference with zero.
pub fn compare_batch(party: &mut MainParty, diffs: &[ArithShare]) -> MpcResult<Vec<ComparisonResult>> {
    #[cfg(feature = "verbose-timing")]
    let start = Instant::now();
    let role = party.role();
    let bits = arith_to_bin(party, diffs)?;
    let mut zero: Vec<XorShare> = bits.iter().map(|b| b.not(role)).collect();
    for shift in PREFIX_SHIFTS.iter().rev() {
        let shifted: Vec<XorShare> = zero.iter().map(|z| *z >> *shift).collect();
        zero = and(party, &zero, &shifted)?;
    }
    party.record_comparisons(diffs.len());
    #[cfg(feature = "verbose-timing")]
    {
        if let Ok(mut timer) = PARTY_TIMER.lock() {
            timer.report_time("compare", start.elapsed());
        }
    }
    Ok(bits
        .iter()
        .zip(zero)
        .map(|(b, z)| {
            let lt = b.bit(63);
            let eq = z.bit(0);
            ComparisonResult {
                lt,
                eq,
                gt: (lt ^ eq).not(role),
            }
        })
        .collect())
}

/// Returns a share of `diff < 0`.
pub fn less_than(party: &mut MainParty, diff: ArithShare) -> MpcResult<BitShare> {
    let mut res = less_than_batch(party, &[diff])?;
    Ok(res.remove(0))
}

/// Compares a single shared difference with zero.
pub fn compare(party: &mut MainParty, diff: ArithShare) -> MpcResult<ComparisonResult> {
    let mut res = compare_batch(party, &[diff])?;
    Ok(res.remove(0))
}

#[cfg(test)]
mod test {
    use rand::{thread_rng, Rng};

    use crate::compare::{
        arith_to_bin, compare, compare_batch, less_than, less_than_batch, EQ_AND_WORDS,
        LT_AND_WORDS,
    };
    use crate::party::correlated_randomness::{
        CorrelationDemand, PreprocessedStore, TrustedDealer,
    };
    use crate::party::test_export::localhost_setup;
    use crate::share::test::{reconstruct_bit, reconstruct_xor};
    use crate::share::{encode, ArithShare, MAX_ABS_VALUE, PAD_VALUE};

    fn share(values: &[i64]) -> (Vec<ArithShare>, Vec<ArithShare>) {
        let mut rng = thread_rng();
        values
            .iter()
            .map(|v| {
                let r: u64 = rng.gen();
                (ArithShare(r), ArithShare(encode(*v).wrapping_sub(r)))
            })
            .unzip()
    }

    fn bit_triples(n: usize, seed: u64) -> (PreprocessedStore, PreprocessedStore) {
        TrustedDealer::from_seed(seed).deal(&CorrelationDemand {
            bit_triples: n,
            ring_triples: 0,
            one_hot: vec![],
        })
    }

    fn edge_values() -> Vec<i64> {
        vec![
            0,
            1,
            -1,
            2,
            -2,
            MAX_ABS_VALUE,
            -MAX_ABS_VALUE,
            // largest differences that occur in a search
            PAD_VALUE + MAX_ABS_VALUE,
            -2 * MAX_ABS_VALUE,
            1 << 32,
            -(1 << 32),
            123456789,
        ]
    }

    #[test]
    fn arith_to_bin_reconstructs() {
        let mut rng = thread_rng();
        let values: Vec<i64> = (0..64).map(|_| rng.gen()).collect();
        let (s0, s1) = share(&values);
        let (c0, c1) = bit_triples(values.len() * LT_AND_WORDS, 1);
        let ((b0, _), (b1, _)) = localhost_setup(
            move |p| {
                p.add_correlations(c0);
                arith_to_bin(p, &s0).unwrap()
            },
            move |p| {
                p.add_correlations(c1);
                arith_to_bin(p, &s1).unwrap()
            },
            None,
        );
        for (i, v) in values.iter().enumerate() {
            assert_eq!(reconstruct_xor(b0[i], b1[i]), encode(*v));
        }
    }

    #[test]
    fn less_than_edge_values() {
        let values = edge_values();
        let (s0, s1) = share(&values);
        let n = values.len();
        let (c0, c1) = bit_triples(n * LT_AND_WORDS, 2);
        let ((r0, p0), (r1, _)) = localhost_setup(
            move |p| {
                p.add_correlations(c0);
                less_than_batch(p, &s0).unwrap()
            },
            move |p| {
                p.add_correlations(c1);
                less_than_batch(p, &s1).unwrap()
            },
            None,
        );
        for (i, v) in values.iter().enumerate() {
            assert_eq!(reconstruct_bit(r0[i], r1[i]), *v < 0, "value {}", v);
        }
        assert_eq!(p0.search_cost().comparisons, n);
        assert!(p0.correlations().is_empty());
    }

    #[test]
    fn compare_edge_values() {
        let values = edge_values();
        let (s0, s1) = share(&values);
        let n = values.len();
        let (c0, c1) = bit_triples(n * (LT_AND_WORDS + EQ_AND_WORDS), 3);
        let ((r0, _), (r1, _)) = localhost_setup(
            move |p| {
                p.add_correlations(c0);
                compare_batch(p, &s0).unwrap()
            },
            move |p| {
                p.add_correlations(c1);
                compare_batch(p, &s1).unwrap()
            },
            None,
        );
        for (i, v) in values.iter().enumerate() {
            assert_eq!(reconstruct_bit(r0[i].lt, r1[i].lt), *v < 0, "lt of {}", v);
            assert_eq!(reconstruct_bit(r0[i].eq, r1[i].eq), *v == 0, "eq of {}", v);
            assert_eq!(reconstruct_bit(r0[i].gt, r1[i].gt), *v > 0, "gt of {}", v);
        }
    }

    #[test]
    fn single_comparisons() {
        let (a0, a1) = share(&[-5]);
        let (b0, b1) = share(&[0]);
        let (c0, c1) = bit_triples(LT_AND_WORDS + (LT_AND_WORDS + EQ_AND_WORDS), 4);
        let ((r0, _), (r1, _)) = localhost_setup(
            move |p| {
                p.add_correlations(c0);
                (less_than(p, a0[0]).unwrap(), compare(p, b0[0]).unwrap())
            },
            move |p| {
                p.add_correlations(c1);
                (less_than(p, a1[0]).unwrap(), compare(p, b1[0]).unwrap())
            },
            None,
        );
        assert!(reconstruct_bit(r0.0, r1.0));
        assert!(!reconstruct_bit(r0.1.lt, r1.1.lt));
        assert!(reconstruct_bit(r0.1.eq, r1.1.eq));
        assert!(!reconstruct_bit(r0.1.gt, r1.1.gt));
    }

    #[test]
    fn random_differences() {
        let mut rng = thread_rng();
        let values: Vec<i64> = (0..200)
            .map(|_| rng.gen_range(-MAX_ABS_VALUE..=MAX_ABS_VALUE) - rng.gen_range(-MAX_ABS_VALUE..=MAX_ABS_VALUE))
            .collect();
        let (s0, s1) = share(&values);
        let (c0, c1) = bit_triples(values.len() * LT_AND_WORDS, 5);
        let ((r0, _), (r1, _)) = localhost_setup(
            move |p| {
                p.add_correlations(c0);
                less_than_batch(p, &s0).unwrap()
            },
            move |p| {
                p.add_correlations(c1);
                less_than_batch(p, &s1).unwrap()
            },
            None,
        );
        for (i, v) in values.iter().enumerate() {
            assert_eq!(reconstruct_bit(r0[i], r1[i]), *v < 0);
        }
    }
}
