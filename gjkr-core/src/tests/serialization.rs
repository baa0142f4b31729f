//! Ciphersuite-generic serialization tests.

use alloc::collections::BTreeMap;

use rand_core::{CryptoRng, RngCore};

use crate::{
    config::Config,
    ephemeral::EphemeralPrivateKey,
    messages::{
        CoefficientCommitment, DkgResultHashSignatureMessage, EphemeralPublicKeyMessage,
        MemberCommitmentsMessage, Message, MisbehavedEphemeralKeysMessage, Payload,
    },
    result::{ChainResult, ResultHash},
    tests::helpers::{generate_element, member, SESSION_ID},
    Ciphersuite,
};

fn ephemeral_public_key_message<C: Ciphersuite, R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Message<C> {
    let keys = (2..=4)
        .map(|i| (member(i), EphemeralPrivateKey::<C>::generate(rng).public_key()))
        .collect();
    Message::new(
        SESSION_ID,
        Payload::EphemeralPublicKey(EphemeralPublicKeyMessage::new(member(1), keys)),
    )
}

/// Test that messages survive the default encoding and JSON.
pub fn check_message_serialization<C: Ciphersuite, R: RngCore + CryptoRng>(mut rng: R) {
    let commitments = (0..3)
        .map(|_| CoefficientCommitment::new(generate_element::<C, _>(&mut rng)))
        .collect();
    let revealed = BTreeMap::from([(member(5), EphemeralPrivateKey::<C>::generate(&mut rng))]);
    let hash = ChainResult::new(vec![2; 33], vec![member(5)]).hash().unwrap();

    let messages = [
        ephemeral_public_key_message::<C, _>(&mut rng),
        Message::new(
            SESSION_ID,
            Payload::MemberCommitments(MemberCommitmentsMessage::new(member(2), commitments)),
        ),
        Message::new(
            SESSION_ID,
            Payload::MisbehavedEphemeralKeys(MisbehavedEphemeralKeysMessage::new(
                member(3),
                revealed,
            )),
        ),
        Message::new(
            SESSION_ID,
            Payload::DkgResultHashSignature(DkgResultHashSignatureMessage::new(
                member(4),
                hash,
                vec![0xaa; 64],
                vec![0xbb; 33],
            )),
        ),
    ];

    for message in messages {
        let bytes = message.serialize().unwrap();
        assert_eq!(Message::<C>::deserialize(&bytes).unwrap(), message);

        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(serde_json::from_str::<Message<C>>(&json).unwrap(), message);
    }
}

/// Test that decoding rejects messages of another ciphersuite, unknown
/// fields and invalid member indices.
pub fn check_message_deserialization_rejects_invalid<C: Ciphersuite, R: RngCore + CryptoRng>(
    mut rng: R,
) {
    let message = ephemeral_public_key_message::<C, _>(&mut rng);
    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["header"]["ciphersuite"], C::ID);
    assert_eq!(value["header"]["version"], 0);

    let mut foreign = value.clone();
    foreign["header"]["ciphersuite"] = "GJKR-unknown-v1".into();
    assert!(serde_json::from_value::<Message<C>>(foreign).is_err());

    let mut future_version = value.clone();
    future_version["header"]["version"] = 1.into();
    assert!(serde_json::from_value::<Message<C>>(future_version).is_err());

    let mut zero_sender = value.clone();
    zero_sender["payload"]["EphemeralPublicKey"]["sender_id"] = 0.into();
    assert!(serde_json::from_value::<Message<C>>(zero_sender).is_err());

    let mut extra_field = value;
    extra_field["extra"] = 1.into();
    assert!(serde_json::from_value::<Message<C>>(extra_field).is_err());

    assert!(Message::<C>::deserialize(&[]).is_err());
}

/// Test that the result hash depends on the misbehaved members but not on
/// their order.
pub fn check_result_hash() {
    let result = ChainResult::new(vec![3; 33], vec![member(4), member(2)]);
    let reordered = ChainResult::new(vec![3; 33], vec![member(2), member(4)]);
    let other = ChainResult::new(vec![3; 33], vec![member(2)]);

    let hash = result.hash().unwrap();
    assert_eq!(hash, reordered.hash().unwrap());
    assert_ne!(hash, other.hash().unwrap());
    assert_eq!(hash, ResultHash::from_bytes(*hash.as_bytes()));
}

/// Test the JSON form of the protocol parameters.
pub fn check_config_serialization() {
    let config = Config::new(64, 33, 6).unwrap();
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(
        json,
        r#"{"group_size":64,"honest_threshold":33,"result_publication_block_step":6}"#
    );
    assert_eq!(serde_json::from_str::<Config>(&json).unwrap(), config);

    let invalid_json =
        r#"{"group_size":64,"honest_threshold":33,"result_publication_block_step":6,"x":1}"#;
    assert!(serde_json::from_str::<Config>(invalid_json).is_err());
}
