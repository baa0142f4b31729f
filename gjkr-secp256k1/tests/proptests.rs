use gjkr_core::tests::proptests::{
    apply_mutation, check_decoded_sender_is_valid, check_decoding_never_panics, encoded_message,
    mutation,
};
use gjkr_secp256k1::Secp256K1Sha256;
use proptest::prelude::*;

proptest! {

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        check_decoding_never_panics::<Secp256K1Sha256>(&bytes);
        check_decoded_sender_is_valid::<Secp256K1Sha256>(&bytes);
    }

    #[test]
    fn mutated_messages_never_panic(
        seed in any::<u64>(),
        mutations in prop::collection::vec(mutation(), 1..4),
    ) {
        let mut bytes = encoded_message::<Secp256K1Sha256>(seed);
        for mutation in mutations {
            if bytes.is_empty() {
                break;
            }
            apply_mutation(&mut bytes, mutation);
        }
        check_decoding_never_panics::<Secp256K1Sha256>(&bytes);
        check_decoded_sender_is_valid::<Secp256K1Sha256>(&bytes);
    }
}
