//! Ephemeral key pairs and the pairwise symmetric keys derived from them.
//!
//! Each member generates one ephemeral key pair per peer in phase 1. A peer's
//! public key and the local private key yield a shared point by
//! Diffie-Hellman over the ciphersuite group; hashing it gives the symmetric
//! key used to encrypt shares for that peer. Revealing an ephemeral private
//! key lets every other member recompute the symmetric key and decrypt what
//! was sent, which is how accusations are made verifiable.

use core::fmt::{self, Debug};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    serialization::{SerializableElement, SerializableScalar},
    Ciphersuite, Element, Error, Field, Group, Scalar,
};

const SYMMETRIC_KEY_DOMAIN: &[u8] = b"GJKR-ephemeral-ecdh-v1";
const NONCE_SIZE: usize = 24;

/// The private half of an ephemeral key pair.
///
/// It is only ever transmitted as part of an accusation or a reveal, after
/// which it no longer protects anything.
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(transparent)]
pub struct EphemeralPrivateKey<C: Ciphersuite>(SerializableScalar<C>);

impl<C> EphemeralPrivateKey<C>
where
    C: Ciphersuite,
{
    /// Generate a random non-zero private key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let scalar = <<C::Group as Group>::Field>::random(rng);
            if scalar != <<C::Group as Group>::Field>::zero() {
                return Self(SerializableScalar(scalar));
            }
        }
    }

    /// The public key corresponding to this private key.
    pub fn public_key(&self) -> EphemeralPublicKey<C> {
        EphemeralPublicKey(SerializableElement(
            <C::Group>::generator() * self.0 .0,
        ))
    }

    /// Perform Diffie-Hellman with the peer's public key and derive the
    /// symmetric key for the pair.
    pub fn ecdh(&self, public_key: &EphemeralPublicKey<C>) -> Result<SymmetricKey, Error> {
        let shared = SerializableElement::<C>(public_key.0 .0 * self.0 .0).serialize()?;
        let mut hasher = Sha256::new();
        hasher.update(SYMMETRIC_KEY_DOMAIN);
        hasher.update(C::ID.as_bytes());
        hasher.update(&shared);
        Ok(SymmetricKey(hasher.finalize().into()))
    }

    pub(crate) fn to_scalar(self) -> Scalar<C> {
        self.0 .0
    }
}

impl<C> Debug for EphemeralPrivateKey<C>
where
    C: Ciphersuite,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EphemeralPrivateKey")
            .field(&"<redacted>")
            .finish()
    }
}

impl<C> Zeroize for EphemeralPrivateKey<C>
where
    C: Ciphersuite,
{
    fn zeroize(&mut self) {
        self.0 .0 = <<C::Group as Group>::Field>::zero();
    }
}

/// The public half of an ephemeral key pair.
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(transparent)]
pub struct EphemeralPublicKey<C: Ciphersuite>(SerializableElement<C>);

impl<C> EphemeralPublicKey<C>
where
    C: Ciphersuite,
{
    /// Create a public key from a group element.
    pub fn new(element: Element<C>) -> Self {
        Self(SerializableElement(element))
    }

    /// The underlying group element.
    pub fn to_element(&self) -> Element<C> {
        self.0 .0
    }
}

impl<C> Debug for EphemeralPublicKey<C>
where
    C: Ciphersuite,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EphemeralPublicKey")
            .field(
                &self
                    .0
                    .serialize()
                    .map(hex::encode)
                    .unwrap_or("<invalid>".to_string()),
            )
            .finish()
    }
}

/// An ephemeral key pair generated for exactly one peer.
#[derive(Clone)]
pub struct EphemeralKeyPair<C: Ciphersuite> {
    private_key: EphemeralPrivateKey<C>,
    public_key: EphemeralPublicKey<C>,
}

impl<C> EphemeralKeyPair<C>
where
    C: Ciphersuite,
{
    /// Generate a fresh key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let private_key = EphemeralPrivateKey::generate(rng);
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
        }
    }

    /// The private key.
    pub fn private_key(&self) -> &EphemeralPrivateKey<C> {
        &self.private_key
    }

    /// The public key.
    pub fn public_key(&self) -> &EphemeralPublicKey<C> {
        &self.public_key
    }
}

impl<C> Debug for EphemeralKeyPair<C>
where
    C: Ciphersuite,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl<C> Drop for EphemeralKeyPair<C>
where
    C: Ciphersuite,
{
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// A symmetric key shared by one ordered pair of members.
///
/// Ciphertexts are `nonce || XChaCha20-Poly1305(plaintext)` with a random
/// 24-byte nonce.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let cipher =
            XChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| Error::EncryptionError)?;
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::EncryptionError)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a ciphertext produced by [`SymmetricKey::encrypt`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(Error::DecryptionError);
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
        let cipher =
            XChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| Error::DecryptionError)?;
        cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| Error::DecryptionError)
    }
}

impl Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SymmetricKey").field(&"<redacted>").finish()
    }
}
