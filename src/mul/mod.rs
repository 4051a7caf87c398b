//! Opening of shares and Beaver-triple based multiplication.
//!
//! Every function in this module that communicates takes exactly one round.
//! [bit_to_arith] and [cond_mul] are composed of the others.
use itertools::{izip, Itertools};
use rayon::prelude::*;

use crate::party::correlated_randomness::RingTriple;
use crate::party::error::{MpcError, MpcResult};
use crate::party::{MainParty, Role};
use crate::share::{ArithShare, BitShare, HasZero, XorShare};

/// Below this many products the local work is not worth handing to the thread pool.
const PAR_THRESHOLD: usize = 1 << 12;

fn check_len(a: usize, b: usize) -> MpcResult<()> {
    if a != b {
        return Err(MpcError::InvalidParameters(format!(
            "operand lengths differ: {} vs {}",
            a, b
        )));
    }
    Ok(())
}

/// Reveals additively shared values to both parties.
pub fn open_arith(party: &mut MainParty, shares: &[ArithShare]) -> MpcResult<Vec<u64>> {
    let theirs = party.exchange_field(shares)?;
    Ok(shares
        .iter()
        .zip(theirs)
        .map(|(mine, theirs)| (*mine + theirs).0)
        .collect())
}

/// Reveals XOR-shared words to both parties.
pub fn open_xor(party: &mut MainParty, shares: &[XorShare]) -> MpcResult<Vec<u64>> {
    let theirs = party.exchange_field(shares)?;
    Ok(shares
        .iter()
        .zip(theirs)
        .map(|(mine, theirs)| (*mine ^ theirs).0)
        .collect())
}

/// Opens `x - a` and `y - b` for every triple and returns the opened pairs.
fn open_masked(
    party: &mut MainParty,
    x: &[ArithShare],
    y: &[ArithShare],
    triples: &[RingTriple],
) -> MpcResult<Vec<(u64, u64)>> {
    let n = x.len();
    let mut masked = Vec::with_capacity(2 * n);
    masked.extend(izip!(x, triples).map(|(x, t)| *x - t.a));
    masked.extend(izip!(y, triples).map(|(y, t)| *y - t.b));
    let opened = open_arith(party, &masked)?;
    Ok(opened[..n]
        .iter()
        .copied()
        .zip(opened[n..].iter().copied())
        .collect())
}

/// `[x*y] = [c] + d[b] + e[a] + de` for `d = x - a`, `e = y - b`.
fn beaver_local(role: Role, t: &RingTriple, d: u64, e: u64) -> ArithShare {
    let mut z = t.c + t.b * d + t.a * e;
    if role == Role::P0 {
        z += ArithShare(d.wrapping_mul(e));
    }
    z
}

/// Element-wise product of additively shared vectors.
pub fn mul(party: &mut MainParty, x: &[ArithShare], y: &[ArithShare]) -> MpcResult<Vec<ArithShare>> {
    check_len(x.len(), y.len())?;
    let triples = party.correlations_mut().take_ring_triples(x.len())?;
    let opened = open_masked(party, x, y, &triples)?;
    let role = party.role();
    Ok(triples
        .iter()
        .zip_eq(opened)
        .map(|(t, (d, e))| beaver_local(role, t, d, e))
        .collect())
}

/// Inner product of additively shared vectors, using one triple per position.
pub fn inner_product(party: &mut MainParty, x: &[ArithShare], y: &[ArithShare]) -> MpcResult<ArithShare> {
    check_len(x.len(), y.len())?;
    let triples = party.correlations_mut().take_ring_triples(x.len())?;
    let opened = open_masked(party, x, y, &triples)?;
    let role = party.role();
    let sum = |(t, (d, e)): (&RingTriple, &(u64, u64))| beaver_local(role, t, *d, *e).0;
    let total = if party.has_multi_threading() && triples.len() >= PAR_THRESHOLD {
        party.run_in_threadpool(|| {
            triples
                .par_iter()
                .zip(opened.par_iter())
                .map(sum)
                .reduce(|| 0u64, |a, b| a.wrapping_add(b))
        })
    } else {
        triples
            .iter()
            .zip(opened.iter())
            .map(sum)
            .fold(0u64, |a, b| a.wrapping_add(b))
    };
    Ok(ArithShare(total))
}

/// Bitwise AND of XOR-shared words.
pub fn and(party: &mut MainParty, x: &[XorShare], y: &[XorShare]) -> MpcResult<Vec<XorShare>> {
    check_len(x.len(), y.len())?;
    let n = x.len();
    let triples = party.correlations_mut().take_bit_triples(n)?;
    let mut masked = Vec::with_capacity(2 * n);
    masked.extend(izip!(x, &triples).map(|(x, t)| *x ^ t.a));
    masked.extend(izip!(y, &triples).map(|(y, t)| *y ^ t.b));
    let opened = open_xor(party, &masked)?;
    let role = party.role();
    Ok(izip!(&triples, &opened[..n], &opened[n..])
        .map(|(t, d, e)| {
            let z = t.c ^ (t.b & *d) ^ (t.a & *e);
            z ^ XorShare::constant(d & e, role)
        })
        .collect())
}

/// Converts XOR-shared bits into additive shares of 0 or 1.
///
/// With `b = b0 xor b1` held as `b0` by P0 and `b1` by P1, `b = b0 + b1 - 2 b0 b1`.
pub fn bit_to_arith(party: &mut MainParty, bits: &[BitShare]) -> MpcResult<Vec<ArithShare>> {
    let role = party.role();
    let own: Vec<ArithShare> = bits.iter().map(|b| ArithShare(b.0 as u64)).collect();
    let zero = vec![ArithShare::ZERO; bits.len()];
    let (lhs, rhs) = match role {
        Role::P0 => (own, zero),
        Role::P1 => (zero, own),
    };
    let products = mul(party, &lhs, &rhs)?;
    Ok(izip!(lhs, rhs, products)
        .map(|(l, r, prod)| l + r - prod * 2)
        .collect())
}

/// Returns shares of `flag * value` for every pair.
pub fn cond_mul(
    party: &mut MainParty,
    flags: &[BitShare],
    values: &[ArithShare],
) -> MpcResult<Vec<ArithShare>> {
    check_len(flags.len(), values.len())?;
    let flags = bit_to_arith(party, flags)?;
    mul(party, &flags, values)
}
