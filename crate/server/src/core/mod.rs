//! Gateway core: one authenticated HSM session serving every request.
//!
//! The session handle is the process-wide shared resource. PKCS#11 modules
//! are not assumed to tolerate concurrent operations on one session, so the
//! whole find-key/cipher sequence of each request runs under a single mutex.
//! Requests block for the duration of a hardware call; transports dispatch
//! into this module from a blocking-friendly context.

use std::sync::{Mutex, MutexGuard};

use keybridge_hsm::{CipherMode, KeyClass, Session, envelope, padding};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::{error::ServerError, result::SResult};

/// The encrypt/decrypt contract both transports bind to.
///
/// `key_type` is the logical key selector from the request. A single
/// configured label currently serves all types; the field is accepted so the
/// wire contract stays stable if dispatching is ever introduced.
pub trait CryptoService: Send + Sync {
    /// Encrypt `plaintext` and return the IV-bound envelope.
    fn encrypt(&self, key_type: &str, plaintext: &[u8]) -> SResult<Vec<u8>>;

    /// Recover the plaintext from an IV-bound envelope.
    fn decrypt(&self, key_type: &str, envelope: &[u8]) -> SResult<Zeroizing<Vec<u8>>>;
}

/// The production service: resolves the configured key label on the shared
/// session and runs the padded CBC mechanism, binding each ciphertext to the
/// fresh IV that produced it.
pub struct Gateway {
    session: Mutex<Session>,
    key_label: String,
    iv_size: usize,
}

impl Gateway {
    #[must_use]
    pub fn new(session: Session, key_label: impl Into<String>, iv_size: usize) -> Self {
        Self {
            session: Mutex::new(session),
            key_label: key_label.into(),
            iv_size,
        }
    }

    fn session(&self) -> SResult<MutexGuard<'_, Session>> {
        self.session
            .lock()
            .map_err(|_| ServerError::ServerError("session lock poisoned".to_owned()))
    }

    /// Round-trip a sample through every supported mechanism on the
    /// configured key: the padded mode used by the request path, then the
    /// raw modes with caller-side PKCS#7 padding to `pad_block_size`.
    pub fn self_test(&self, pad_block_size: usize) -> SResult<()> {
        const SAMPLE: &[u8] = b"keybridge hardware self test";

        let session = self.session()?;
        let key = session.find_key(KeyClass::Secret, &self.key_label)?;

        let iv = session.generate_iv(self.iv_size)?;
        let ciphertext = session.encrypt(key, CipherMode::AesCbcPad, &iv, SAMPLE)?;
        let wrapped = envelope::wrap(&iv, &ciphertext);
        let (iv_out, ciphertext_out) = envelope::unwrap(&wrapped, self.iv_size)?;
        let plaintext = session.decrypt(key, CipherMode::AesCbcPad, iv_out, ciphertext_out)?;
        if plaintext.as_slice() != SAMPLE {
            return Err(ServerError::ServerError(
                "padded-mode round trip mismatch".to_owned(),
            ));
        }

        let mut padded = SAMPLE.to_vec();
        padding::pkcs7_pad(&mut padded, pad_block_size)?;
        for mode in [CipherMode::AesEcb, CipherMode::AesCbc] {
            let iv = session.generate_iv(self.iv_size)?;
            let ciphertext = session.encrypt(key, mode, &iv, &padded)?;
            let decrypted = session.decrypt(key, mode, &iv, &ciphertext)?;
            let plaintext = padding::pkcs7_unpad(decrypted, pad_block_size)?;
            if plaintext.as_slice() != SAMPLE {
                return Err(ServerError::ServerError(format!(
                    "{mode:?} round trip mismatch"
                )));
            }
        }

        info!("self test passed for key {}", self.key_label);
        Ok(())
    }
}

impl CryptoService for Gateway {
    fn encrypt(&self, key_type: &str, plaintext: &[u8]) -> SResult<Vec<u8>> {
        debug!("encrypting {} bytes for type {key_type}", plaintext.len());
        let session = self.session()?;
        let key = session.find_key(KeyClass::Secret, &self.key_label)?;
        let iv = session.generate_iv(self.iv_size)?;
        let ciphertext = session.encrypt(key, CipherMode::AesCbcPad, &iv, plaintext)?;
        Ok(envelope::wrap(&iv, &ciphertext))
    }

    fn decrypt(&self, key_type: &str, data: &[u8]) -> SResult<Zeroizing<Vec<u8>>> {
        debug!("decrypting {} bytes for type {key_type}", data.len());
        let session = self.session()?;
        let (iv, ciphertext) = envelope::unwrap(data, self.iv_size)?;
        let key = session.find_key(KeyClass::Secret, &self.key_label)?;
        Ok(session.decrypt(key, CipherMode::AesCbcPad, iv, ciphertext)?)
    }
}
