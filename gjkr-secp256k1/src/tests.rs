use gjkr_core::{Ciphersuite, Field, Group, GroupError};

use crate::*;

#[test]
fn blinding_generator_is_independent_of_the_generator() {
    let h = Secp256K1Sha256::blinding_generator();

    assert!(h != Secp256K1Group::identity());
    assert!(h != Secp256K1Group::generator());
    assert!(h == Secp256K1Sha256::blinding_generator());
}

#[test]
fn scalar_hash_depends_on_the_input() {
    assert!(Secp256K1Sha256::H1(b"a") == Secp256K1Sha256::H1(b"a"));
    assert!(Secp256K1Sha256::H1(b"a") != Secp256K1Sha256::H1(b"b"));
}

#[test]
fn zero_has_no_inverse() {
    assert_eq!(
        Secp256K1ScalarField::invert(&Secp256K1ScalarField::zero()),
        Err(FieldError::InvalidZeroScalar)
    );
}

#[test]
fn identity_does_not_serialize() {
    assert_eq!(
        Secp256K1Group::serialize(&Secp256K1Group::identity()),
        Err(GroupError::InvalidIdentityElement)
    );
}
