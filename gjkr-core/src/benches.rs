//! Ciphersuite-generic benchmark functions.
#![allow(clippy::unwrap_used)]

use alloc::format;

use criterion::{BenchmarkId, Criterion, Throughput};
use rand_core::{CryptoRng, RngCore};

use crate::{
    config::Config,
    ephemeral::EphemeralKeyPair,
    tests::helpers::{no_tampering, run_member_chain},
    Ciphersuite,
};

/// Benchmark a complete key generation of all members, without a network,
/// with the specified ciphersuite.
pub fn bench_dkg<C: Ciphersuite, R: RngCore + CryptoRng + Clone>(
    c: &mut Criterion,
    name: &str,
    rng: &mut R,
) {
    let mut group = c.benchmark_group(format!("GJKR {name}"));
    group.sample_size(10);
    for &group_size in [4usize, 8, 16].iter() {
        let honest_threshold = group_size / 2 + 1;
        let config = Config::new(group_size, honest_threshold, 1).unwrap();
        group.throughput(Throughput::Elements(group_size as u64));

        group.bench_with_input(
            BenchmarkId::new("Member chain", group_size),
            &config,
            |b, config| {
                let mut rng = rng.clone();
                b.iter(|| {
                    let outcomes = run_member_chain::<C, _, _>(config, &mut rng, no_tampering::<C>);
                    assert!(outcomes.values().all(Result::is_ok));
                })
            },
        );
    }
    group.finish();
}

/// Benchmark the symmetric key agreement and share encryption between two
/// members with the specified ciphersuite.
pub fn bench_share_encryption<C: Ciphersuite, R: RngCore + CryptoRng + Clone>(
    c: &mut Criterion,
    name: &str,
    rng: &mut R,
) {
    let mut group = c.benchmark_group(format!("Share encryption {name}"));

    let local = EphemeralKeyPair::<C>::generate(rng);
    let peer = EphemeralKeyPair::<C>::generate(rng);
    let key = local.private_key().ecdh(peer.public_key()).unwrap();
    let share = [0x42u8; 32];

    group.bench_function("ECDH", |b| {
        b.iter(|| local.private_key().ecdh(peer.public_key()).unwrap())
    });

    let mut encrypt_rng = rng.clone();
    group.bench_function("Encrypt", |b| {
        b.iter(|| key.encrypt(&mut encrypt_rng, &share).unwrap())
    });

    let ciphertext = key.encrypt(rng, &share).unwrap();
    group.bench_function("Decrypt", |b| b.iter(|| key.decrypt(&ciphertext).unwrap()));

    group.finish();
}
