#![allow(non_snake_case)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc = include_str!("../README.md")]
#![doc = document_features::document_features!()]

use k256::{
    elliptic_curve::{
        group::prime::PrimeCurveAffine,
        hash2curve::{hash_to_field, ExpandMsgXmd, GroupDigest},
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field as FFField, PrimeField,
    },
    AffinePoint, ProjectivePoint, Scalar, Secp256k1,
};
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;

#[cfg(test)]
mod tests;

// Re-exports in our public API
pub use gjkr_core::{Ciphersuite, Field, FieldError, Group, GroupError};
pub use rand_core;

/// An error.
pub type Error = gjkr_core::Error;

/// The secp256k1 scalar field.
#[derive(Clone, Copy)]
pub struct Secp256K1ScalarField;

impl Field for Secp256K1ScalarField {
    type Scalar = Scalar;

    type Serialization = [u8; 32];

    fn zero() -> Self::Scalar {
        Scalar::ZERO
    }

    fn one() -> Self::Scalar {
        Scalar::ONE
    }

    fn invert(scalar: &Self::Scalar) -> Result<Self::Scalar, FieldError> {
        // [`Scalar`]'s Eq/PartialEq does a constant-time comparison
        Option::from(scalar.invert()).ok_or(FieldError::InvalidZeroScalar)
    }

    fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self::Scalar {
        Scalar::random(rng)
    }

    fn serialize(scalar: &Self::Scalar) -> Self::Serialization {
        scalar.to_bytes().into()
    }

    fn deserialize(buf: &Self::Serialization) -> Result<Self::Scalar, FieldError> {
        let field_bytes: &k256::FieldBytes = buf.into();
        match Scalar::from_repr(*field_bytes).into() {
            Some(s) => Ok(s),
            None => Err(FieldError::MalformedScalar),
        }
    }
}

/// The secp256k1 group.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Secp256K1Group;

impl Group for Secp256K1Group {
    type Field = Secp256K1ScalarField;

    type Element = ProjectivePoint;

    /// [SEC 1][1] serialization of a compressed point in secp256k1 takes 33 bytes
    /// (1-byte prefix and 32 bytes for the coordinate).
    ///
    /// The identity is never serialized: commitments, key share points and
    /// ephemeral keys are all non-identity.
    ///
    /// [1]: https://secg.org/sec1-v2.pdf
    type Serialization = [u8; 33];

    fn identity() -> Self::Element {
        ProjectivePoint::IDENTITY
    }

    fn generator() -> Self::Element {
        ProjectivePoint::GENERATOR
    }

    fn serialize(element: &Self::Element) -> Result<Self::Serialization, GroupError> {
        if *element == Self::identity() {
            return Err(GroupError::InvalidIdentityElement);
        }
        let mut fixed_serialized = [0; 33];
        let serialized_point = element.to_affine().to_encoded_point(true);
        fixed_serialized.copy_from_slice(serialized_point.as_bytes());
        Ok(fixed_serialized)
    }

    fn deserialize(buf: &Self::Serialization) -> Result<Self::Element, GroupError> {
        let encoded_point =
            k256::EncodedPoint::from_bytes(buf).map_err(|_| GroupError::MalformedElement)?;

        match Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded_point)) {
            Some(point) if point.is_identity().into() => Err(GroupError::InvalidIdentityElement),
            Some(point) => Ok(ProjectivePoint::from(point)),
            None => Err(GroupError::MalformedElement),
        }
    }
}

/// Context string of the ciphersuite, also its ID.
const CONTEXT_STRING: &str = "GJKR-secp256k1-SHA256-v1";

fn hash_to_scalar(domain: &[&[u8]], msg: &[u8]) -> Scalar {
    let mut u = [Secp256K1ScalarField::zero()];
    hash_to_field::<ExpandMsgXmd<Sha256>, Scalar>(&[msg], domain, &mut u)
        .expect("should never return error according to error cases described in ExpandMsgXmd");
    u[0]
}

/// GJKR over secp256k1 with SHA-256.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Secp256K1Sha256;

impl Ciphersuite for Secp256K1Sha256 {
    const ID: &'static str = CONTEXT_STRING;

    type Group = Secp256K1Group;

    /// `h = hash_to_curve("pedersen-h")` with the secp256k1_XMD:SHA-256_SSWU_RO_
    /// suite, so that its discrete logarithm to `g` is unknown.
    fn blinding_generator() -> ProjectivePoint {
        Secp256k1::hash_from_bytes::<ExpandMsgXmd<Sha256>>(
            &[b"pedersen-h"],
            &[CONTEXT_STRING.as_bytes(), b"blinding-generator"],
        )
        .expect("should never return error according to error cases described in ExpandMsgXmd")
    }

    fn H1(m: &[u8]) -> Scalar {
        hash_to_scalar(&[CONTEXT_STRING.as_bytes(), b"chal"], m)
    }
}
