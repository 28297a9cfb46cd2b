use crate::{block::Transaction, error::ChainError};
use anyhow::{Context, Result, bail};
use ed25519_dalek::{
    PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, Signature, Signer, SigningKey, Verifier, VerifyingKey,
};
use rand::rngs::OsRng;
use std::{fs, path::Path};

pub const ADDRESS_LEN: usize = 20;

pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let mut csprng = OsRng;
    let signing_key = SigningKey::generate(&mut csprng);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

// An account address is the trailing 20 bytes of the public key digest;
// hex-encoded wherever a string form is needed.
pub fn address_of(key: &VerifyingKey) -> Vec<u8> {
    let digest = blake3::hash(key.as_bytes());
    digest.as_bytes()[32 - ADDRESS_LEN..].to_vec()
}

pub fn sign_transaction(tx: &mut Transaction, key: &SigningKey) {
    let sig = key.sign(&tx.digest());
    tx.signature = sig.to_bytes().to_vec();
    tx.public_key = key.verifying_key().to_bytes().to_vec();
}

/// Checks the embedded signature against the embedded public key over the
/// transaction's field digest. Mint transactions carry neither and must be
/// skipped by the caller.
pub fn verify_transaction(tx: &Transaction) -> Result<(), ChainError> {
    let pk_bytes: [u8; PUBLIC_KEY_LENGTH] = tx
        .public_key
        .as_slice()
        .try_into()
        .map_err(|_| ChainError::InvalidPublicKey)?;
    let key = VerifyingKey::from_bytes(&pk_bytes).map_err(|_| ChainError::InvalidPublicKey)?;

    let sig =
        Signature::try_from(tx.signature.as_slice()).map_err(|_| ChainError::InvalidSignature)?;

    key.verify(&tx.digest(), &sig)
        .map_err(|_| ChainError::InvalidSignature)
}

pub fn save_keypair(dir: &Path, key: &SigningKey) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating wallet dir `{}`", dir.display()))?;
    fs::write(dir.join("node.key"), key.to_bytes()).context("writing node.key")?;
    fs::write(dir.join("node.pub"), key.verifying_key().to_bytes())
        .context("writing node.pub")?;
    Ok(())
}

pub fn load_signing_key(dir: &Path) -> Result<SigningKey> {
    let sk_bytes = fs::read(dir.join("node.key")).context("reading node.key (32-byte seed)")?;
    if sk_bytes.len() != SECRET_KEY_LENGTH {
        bail!("node.key must be {} bytes", SECRET_KEY_LENGTH);
    }
    let mut seed = [0u8; SECRET_KEY_LENGTH];
    seed.copy_from_slice(&sk_bytes);
    Ok(SigningKey::from_bytes(&seed))
}
