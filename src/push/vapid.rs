use base64::{URL_SAFE_NO_PAD, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

use crate::config;
use crate::types::push::VapidConfig;

pub const DEFAULT_PUBLIC_KEY_PREFIX: &str = "BP";

#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub(crate) enum VapidConfigStatus {
    Missing,
    Incomplete,
    Ready(VapidConfig),
}

#[derive(Debug, Error)]
pub enum VapidError {
    #[error("public key prefix '{0}' can never match an uncompressed P-256 key")]
    UnreachablePrefix(String),
    #[error("failed to derive VAPID public key: {0}")]
    Derive(#[from] web_push::WebPushError),
}

/// Both keys are required; the subject falls back to the marketplace contact.
pub(crate) fn load_vapid_config(config: &config::AppConfig) -> VapidConfigStatus {
    let private_key = non_empty(config.vapid_private_key.as_deref());
    let public_key = non_empty(config.vapid_public_key.as_deref());
    let subject = non_empty(config.vapid_subject.as_deref())
        .unwrap_or(config::DEFAULT_VAPID_SUBJECT);

    match (private_key, public_key) {
        (Some(private_key), Some(public_key)) => VapidConfigStatus::Ready(VapidConfig {
            private_key: private_key.to_string(),
            public_key: public_key.to_string(),
            subject: subject.to_string(),
        }),
        (None, None) => VapidConfigStatus::Missing,
        _ => VapidConfigStatus::Incomplete,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn generate_vapid_credentials(prefix: &str) -> Result<VapidCredentials, VapidError> {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng, prefix)
}

/// Draws key pairs until the encoded public key starts with `prefix`.
pub(crate) fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    prefix: &str,
) -> Result<VapidCredentials, VapidError> {
    if !prefix_is_reachable(prefix) {
        return Err(VapidError::UnreachablePrefix(prefix.to_string()));
    }

    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let key_pair = generate_es256_keypair_with_rng(rng);
        let credentials = encode_credentials(&key_pair)?;
        if credentials.public_key.starts_with(prefix) {
            tracing::debug!(attempts, "generated VAPID key pair");
            return Ok(credentials);
        }
    }
}

fn encode_credentials(key_pair: &ES256KeyPair) -> Result<VapidCredentials, VapidError> {
    let private_key = encode_config(key_pair.to_bytes(), URL_SAFE_NO_PAD);
    let public_key =
        web_push::VapidSignatureBuilder::from_base64_no_sub(&private_key, URL_SAFE_NO_PAD)?
            .get_public_key();
    let public_key = encode_config(public_key, URL_SAFE_NO_PAD);

    Ok(VapidCredentials {
        private_key,
        public_key,
    })
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}

// The uncompressed point starts with 0x04, so the first character is always
// 'B' and the second carries two zero bits ('A'..='P').
fn prefix_is_reachable(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        None => return true,
        Some('B') => {}
        Some(_) => return false,
    }
    if let Some(second) = chars.next()
        && !('A'..='P').contains(&second)
    {
        return false;
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}
