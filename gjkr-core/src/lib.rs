#![allow(non_snake_case)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc = include_str!("../README.md")]
#![doc = document_features::document_features!()]

extern crate alloc;

use core::marker::PhantomData;

pub mod chain;
pub mod config;
pub mod dkg;
pub mod ephemeral;
mod error;
pub mod evidence;
pub mod executor;
pub mod group;
pub mod inactivity;
pub mod local;
pub mod member;
pub mod messages;
pub mod net;
mod polynomial;
pub mod publication;
pub mod result;
mod serialization;
pub mod state;
mod traits;

#[cfg(any(test, feature = "test-impl"))]
pub mod tests;

#[cfg(feature = "test-impl")]
pub mod benches;

pub use error::{ChainError, Error, FieldError, GroupError, NetError};
pub use rand_core;
pub use traits::{Ciphersuite, Element, Field, Group, Scalar};

/// Header for serialized messages, identifying the format version and the
/// ciphersuite.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(deny_unknown_fields)]
pub struct Header<C: Ciphersuite> {
    /// Format version
    #[serde(deserialize_with = "crate::serialization::version_deserialize::<_>")]
    version: u8,
    /// Ciphersuite ID
    #[serde(serialize_with = "crate::serialization::ciphersuite_serialize::<_, C>")]
    #[serde(deserialize_with = "crate::serialization::ciphersuite_deserialize::<_, C>")]
    ciphersuite: (),
    #[serde(skip)]
    phantom: PhantomData<C>,
}

impl<C> Default for Header<C>
where
    C: Ciphersuite,
{
    fn default() -> Self {
        Self {
            version: Default::default(),
            ciphersuite: Default::default(),
            phantom: Default::default(),
        }
    }
}
