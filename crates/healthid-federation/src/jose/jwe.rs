//! Compact JWE with ECDH-ES key agreement and A256GCM content encryption.
//!
//! Identity providers return the ID token as a JWE encrypted to the relying
//! party's published encryption key. The content encryption key is derived
//! directly from the ECDH shared secret (no wrapped key, empty second
//! segment) with the Concat KDF of RFC 7518 section 4.6.
//!
//! # Example
//!
//! ```ignore
//! let envelope = CompactJwe::parse(&token_response.id_token)?;
//! let inner = jwe::decrypt(&envelope, &key_lookup)?;
//! let jws = CompactJws::parse(std::str::from_utf8(&inner)?)?;
//! ```

use std::collections::HashMap;
use std::fmt;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::ecdh::EphemeralSecret;
use p256::{PublicKey, SecretKey};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::JweError;
use super::jwk::{EncryptionKeyPair, JsonWebKey, JwkSet};

/// Key management algorithm.
pub const ECDH_ES: &str = "ECDH-ES";

/// Content encryption algorithm.
pub const A256GCM: &str = "A256GCM";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_BITS: u32 = 256;

// ============================================================================
// Key Lookup
// ============================================================================

/// Resolves private decryption keys by key ID.
pub trait DecryptionKeyLookup: Send + Sync {
    /// Returns the private key registered under `kid`.
    fn by_key_id(&self, kid: &str) -> Option<SecretKey>;
}

/// In-memory [`DecryptionKeyLookup`].
#[derive(Clone, Default)]
pub struct StaticKeyLookup {
    keys: HashMap<String, SecretKey>,
}

impl StaticKeyLookup {
    /// Creates an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key.
    #[must_use]
    pub fn with_key(mut self, kid: impl Into<String>, key: SecretKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }

    /// Builds a lookup from encryption key pairs.
    #[must_use]
    pub fn from_key_pairs<'a>(pairs: impl IntoIterator<Item = &'a EncryptionKeyPair>) -> Self {
        pairs.into_iter().fold(Self::new(), |lookup, pair| {
            lookup.with_key(pair.kid(), pair.secret_key().clone())
        })
    }

    /// Builds a lookup from a private JWK set document.
    ///
    /// Keys without `kid` or without a P-256 private scalar are skipped.
    ///
    /// # Errors
    ///
    /// Returns `JweError::InvalidKey` if the document is not a JWK set.
    pub fn from_private_jwks_json(json: &str) -> Result<Self, JweError> {
        let set: JwkSet =
            serde_json::from_str(json).map_err(|e| JweError::InvalidKey(e.to_string()))?;

        let mut lookup = Self::new();
        for key in &set.keys {
            match (key.kid(), key.to_p256_secret_key()) {
                (Some(kid), Some(secret)) => lookup = lookup.with_key(kid, secret),
                _ => tracing::warn!("Skipping unusable decryption key {:?}", key.kid()),
            }
        }
        Ok(lookup)
    }

    /// Returns the number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no key is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl DecryptionKeyLookup for StaticKeyLookup {
    fn by_key_id(&self, kid: &str) -> Option<SecretKey> {
        self.keys.get(kid).cloned()
    }
}

impl fmt::Debug for StaticKeyLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeyLookup")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Protected header of an ECDH-ES JWE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JweHeader {
    /// Key management algorithm.
    pub alg: String,

    /// Content encryption algorithm.
    pub enc: String,

    /// Recipient key ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Ephemeral public key of the sender.
    pub epk: JsonWebKey,

    /// Agreement PartyUInfo (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apu: Option<String>,

    /// Agreement PartyVInfo (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apv: Option<String>,

    /// Content type of the plaintext ("JWT" for nested tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
}

/// A parsed five-segment compact JWE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactJwe {
    header: JweHeader,
    protected: String,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl CompactJwe {
    /// Parses a compact JWE.
    ///
    /// # Errors
    ///
    /// Returns `JweError::Malformed` for anything other than five base64url
    /// segments with an empty encrypted key.
    pub fn parse(raw: &str) -> Result<Self, JweError> {
        let segments: Vec<&str> = raw.trim().split('.').collect();
        let [protected, encrypted_key, iv, ciphertext, tag] = segments.as_slice() else {
            return Err(JweError::malformed(format!(
                "expected five segments, got {}",
                segments.len()
            )));
        };

        if !encrypted_key.is_empty() {
            return Err(JweError::malformed(
                "encrypted key must be empty for direct key agreement",
            ));
        }

        let header_bytes = decode(protected, "protected header")?;
        let header: JweHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| JweError::malformed(format!("invalid protected header: {e}")))?;

        Ok(Self {
            header,
            protected: (*protected).to_string(),
            iv: decode(iv, "iv")?,
            ciphertext: decode(ciphertext, "ciphertext")?,
            tag: decode(tag, "tag")?,
        })
    }

    /// Returns the protected header.
    #[must_use]
    pub fn header(&self) -> &JweHeader {
        &self.header
    }

    /// Returns the recipient key ID.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }
}

impl fmt::Display for CompactJwe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}.{}.{}",
            self.protected,
            URL_SAFE_NO_PAD.encode(&self.iv),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
            URL_SAFE_NO_PAD.encode(&self.tag)
        )
    }
}

fn decode(segment: &str, what: &str) -> Result<Vec<u8>, JweError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JweError::malformed(format!("{what} is not base64url: {e}")))
}

// ============================================================================
// Decryption / Encryption
// ============================================================================

/// Decrypts `envelope` with the key the lookup holds for its `kid`.
///
/// # Errors
///
/// - `JweError::UnsupportedAlgorithm` for anything but `ECDH-ES` / `A256GCM`
/// - `JweError::KeyNotFound` if the lookup has no key for the envelope's `kid`
/// - `JweError::InvalidEphemeralKey` if `epk` is not a P-256 public key
/// - `JweError::DecryptionFailed` if authentication of the ciphertext fails
pub fn decrypt(
    envelope: &CompactJwe,
    keys: &dyn DecryptionKeyLookup,
) -> Result<Vec<u8>, JweError> {
    let header = envelope.header();
    if header.alg != ECDH_ES {
        return Err(JweError::UnsupportedAlgorithm(header.alg.clone()));
    }
    if header.enc != A256GCM {
        return Err(JweError::UnsupportedEncryption(header.enc.clone()));
    }

    let kid = header.kid.clone().unwrap_or_default();
    let secret = keys
        .by_key_id(&kid)
        .ok_or_else(|| JweError::KeyNotFound(kid.clone()))?;

    let ephemeral = header
        .epk
        .to_p256_public_key()
        .ok_or(JweError::InvalidEphemeralKey)?;

    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
    let cek = concat_kdf(
        shared.raw_secret_bytes(),
        header.apu.as_deref(),
        header.apv.as_deref(),
    )?;

    if envelope.iv.len() != IV_LEN || envelope.tag.len() != TAG_LEN {
        return Err(JweError::DecryptionFailed);
    }

    let cipher = Aes256Gcm::new_from_slice(&cek).map_err(|_| JweError::DecryptionFailed)?;
    let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&envelope.ciphertext);
    sealed.extend_from_slice(&envelope.tag);

    tracing::trace!("Decrypting JWE for kid {}", kid);

    cipher
        .decrypt(
            Nonce::from_slice(&envelope.iv),
            Payload {
                msg: &sealed,
                aad: envelope.protected.as_bytes(),
            },
        )
        .map_err(|_| JweError::DecryptionFailed)
}

/// Encrypts `plaintext` to `recipient` with ECDH-ES and A256GCM.
///
/// Used by identity provider emulators and tests; the relying party itself
/// only decrypts.
///
/// # Errors
///
/// Returns `JweError::InvalidKey` if `recipient` is not a P-256 public key.
pub fn encrypt(
    plaintext: &[u8],
    recipient: &JsonWebKey,
    content_type: Option<&str>,
) -> Result<CompactJwe, JweError> {
    let recipient_key: PublicKey = recipient
        .to_p256_public_key()
        .ok_or_else(|| JweError::InvalidKey("recipient is not a P-256 key".to_string()))?;

    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let epk = JsonWebKey {
        kid: None,
        use_: None,
        alg: None,
        ..JsonWebKey::from_p256(&ephemeral.public_key(), "", "enc", ECDH_ES)
    };

    let header = JweHeader {
        alg: ECDH_ES.to_string(),
        enc: A256GCM.to_string(),
        kid: recipient.kid.clone(),
        epk,
        apu: None,
        apv: None,
        cty: content_type.map(str::to_string),
    };
    let protected = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header).map_err(|e| JweError::Encryption(e.to_string()))?,
    );

    let shared = ephemeral.diffie_hellman(&recipient_key);
    let cek = concat_kdf(shared.raw_secret_bytes(), None, None)?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let cipher =
        Aes256Gcm::new_from_slice(&cek).map_err(|e| JweError::Encryption(e.to_string()))?;
    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: protected.as_bytes(),
            },
        )
        .map_err(|e| JweError::Encryption(e.to_string()))?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(CompactJwe {
        header,
        protected,
        iv: iv.to_vec(),
        ciphertext: sealed,
        tag,
    })
}

/// Single-round Concat KDF (SHA-256) producing a 256-bit A256GCM key.
fn concat_kdf(
    shared_secret: &[u8],
    apu: Option<&str>,
    apv: Option<&str>,
) -> Result<[u8; 32], JweError> {
    let apu = apu.map(|v| decode(v, "apu")).transpose()?.unwrap_or_default();
    let apv = apv.map(|v| decode(v, "apv")).transpose()?.unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(shared_secret);
    for field in [A256GCM.as_bytes(), apu.as_slice(), apv.as_slice()] {
        hasher.update(length_prefix(field)?);
        hasher.update(field);
    }
    hasher.update(KEY_BITS.to_be_bytes());

    let mut key = [0u8; 32];
    key.copy_from_slice(&hasher.finalize());
    Ok(key)
}

fn length_prefix(field: &[u8]) -> Result<[u8; 4], JweError> {
    u32::try_from(field.len())
        .map(u32::to_be_bytes)
        .map_err(|_| JweError::malformed("agreement info too long"))
}
