//! Hash-based commitments used to agree on seeds for common randomness.
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};

use crate::party::error::{MpcError, MpcResult};

const COMMITMENT_SEC_PARAM: usize = 128 / 8;
const SHA256_OUTPUT_SIZE: usize = 256 / 8;

pub const COMMITMENT_SIZE: usize = COMMITMENT_SEC_PARAM + SHA256_OUTPUT_SIZE;

/// Commits to `msg`. The commitment is `r || SHA256(r || msg)` for a fresh random `r`.
pub fn commit<Random: Rng + CryptoRng>(rand: &mut Random, msg: &[u8]) -> [u8; COMMITMENT_SIZE] {
    let mut commitment = [0u8; COMMITMENT_SIZE];
    rand.fill_bytes(&mut commitment[..COMMITMENT_SEC_PARAM]);
    let mut hasher = Sha256::new();
    hasher.update(&commitment[..COMMITMENT_SEC_PARAM]);
    hasher.update(msg);
    let hash = hasher.finalize();
    commitment[COMMITMENT_SEC_PARAM..].copy_from_slice(&hash);
    commitment
}

/// Checks that `commitment` opens to `msg`.
pub fn open(commitment: &[u8], msg: &[u8]) -> MpcResult<()> {
    if commitment.len() != COMMITMENT_SIZE {
        return Err(MpcError::Commitment);
    }
    let mut hasher = Sha256::new();
    hasher.update(&commitment[..COMMITMENT_SEC_PARAM]);
    hasher.update(msg);
    let hash = hasher.finalize();

    if commitment[COMMITMENT_SEC_PARAM..] == hash[..] {
        Ok(())
    } else {
        Err(MpcError::Commitment)
    }
}
