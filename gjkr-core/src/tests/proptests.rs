//! Ciphersuite-generic functions for proptests

use proptest::prelude::*;
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng;

use crate::{
    ephemeral::EphemeralPrivateKey,
    messages::{EphemeralPublicKeyMessage, Message, Payload},
    tests::helpers::{member, SESSION_ID},
    Ciphersuite,
};

/// A mutation applied to a valid message encoding.
#[derive(Copy, Clone, Debug)]
pub enum Mutation {
    /// Flip one bit at the given position.
    FlipBit(usize),
    /// Cut the encoding to the given length.
    Truncate(usize),
    /// Append a byte.
    Append(u8),
}

/// Strategy for [`Mutation`]s.
pub fn mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        any::<usize>().prop_map(Mutation::FlipBit),
        any::<usize>().prop_map(Mutation::Truncate),
        any::<u8>().prop_map(Mutation::Append),
    ]
}

/// A valid encoded message, generated deterministically from `seed`.
pub fn encoded_message<C: Ciphersuite>(seed: u64) -> Vec<u8> {
    let mut rng = ChaChaRng::seed_from_u64(seed);
    let keys = (2..=3)
        .map(|i| {
            (
                member(i),
                EphemeralPrivateKey::<C>::generate(&mut rng).public_key(),
            )
        })
        .collect();
    Message::<C>::new(
        SESSION_ID,
        Payload::EphemeralPublicKey(EphemeralPublicKeyMessage::new(member(1), keys)),
    )
    .serialize()
    .unwrap()
}

/// Apply `mutation` to `bytes`.
pub fn apply_mutation(bytes: &mut Vec<u8>, mutation: Mutation) {
    match mutation {
        Mutation::FlipBit(position) => {
            let bit = position % (bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);
        }
        Mutation::Truncate(length) => bytes.truncate(length % bytes.len()),
        Mutation::Append(byte) => bytes.push(byte),
    }
}

/// Decoding arbitrary bytes must return, never panic. A successful decoding
/// must re-encode to a message that decodes to the same value.
pub fn check_decoding_never_panics<C: Ciphersuite>(bytes: &[u8]) {
    if let Ok(message) = Message::<C>::deserialize(bytes) {
        let encoded = message.serialize().unwrap();
        assert_eq!(Message::<C>::deserialize(&encoded).unwrap(), message);
    }
}

/// A decoded message never claims sender index 0.
pub fn check_decoded_sender_is_valid<C: Ciphersuite>(bytes: &[u8]) {
    if let Ok(message) = Message::<C>::deserialize(bytes) {
        assert!(message.sender_id().get() >= 1);
    }
}
