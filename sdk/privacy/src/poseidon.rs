//! Poseidon sponge shared by every hash in the crate.
//!
//! Field: BLS12-381 Fr (255 bits), rate 2, capacity 1, 8 full / 57 partial
//! rounds, alpha 5. Every call absorbs a domain tag first so commitments,
//! nullifier hashes, recipient hashes and tree nodes never collide.

use std::sync::OnceLock;

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::{BigInteger, PrimeField};

const PRIME_BITS: u64 = 255;
const RATE: usize = 2;
const CAPACITY: usize = 1;
const FULL_ROUNDS: usize = 8;
const PARTIAL_ROUNDS: usize = 57;
const ALPHA: u64 = 5;

/// "CMT"
pub(crate) const DOMAIN_COMMITMENT: u64 = 0x434d54;
/// "NULL"
pub(crate) const DOMAIN_NULLIFIER: u64 = 0x4e554c4c;
/// "RCPT"
pub(crate) const DOMAIN_RECIPIENT: u64 = 0x52435054;
/// "NODE"
pub(crate) const DOMAIN_NODE: u64 = 0x4e4f4445;
/// "LEAF"
pub(crate) const DOMAIN_EMPTY_LEAF: u64 = 0x4c454146;

static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

fn config() -> &'static PoseidonConfig<Fr> {
    CONFIG.get_or_init(|| {
        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            PRIME_BITS,
            RATE,
            FULL_ROUNDS as u64,
            PARTIAL_ROUNDS as u64,
            0,
        );
        PoseidonConfig::new(FULL_ROUNDS, PARTIAL_ROUNDS, ALPHA, mds, ark, RATE, CAPACITY)
    })
}

/// Hash a domain tag followed by `inputs` into 32 little-endian bytes.
pub(crate) fn hash(domain: u64, inputs: &[Fr]) -> [u8; 32] {
    let mut sponge = PoseidonSponge::new(config());
    sponge.absorb(&Fr::from(domain));
    for input in inputs {
        sponge.absorb(input);
    }
    let out: Vec<Fr> = sponge.squeeze_field_elements(1);
    out.first().copied().map(to_bytes).unwrap_or_default()
}

pub(crate) fn from_bytes(bytes: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

pub(crate) fn to_bytes(f: Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut arr = [0u8; 32];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}
