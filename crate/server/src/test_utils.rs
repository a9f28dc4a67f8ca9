//! Transport-level test doubles for the [`CryptoService`] seam.

use std::sync::atomic::{AtomicU64, Ordering};

use keybridge_hsm::{HsmError, envelope};
use zeroize::Zeroizing;

use crate::{core::CryptoService, result::SResult};

/// A reversible stand-in cipher: XORs the payload with an IV-derived
/// keystream and uses the real envelope codec, so transports exercise the
/// same IV binding and unwrap failures as the production gateway without
/// hardware.
pub(crate) struct XorService {
    iv_size: usize,
    counter: AtomicU64,
}

impl XorService {
    pub(crate) fn new(iv_size: usize) -> Self {
        Self {
            iv_size,
            counter: AtomicU64::new(1),
        }
    }

    fn next_iv(&self) -> Vec<u8> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        n.to_be_bytes().iter().copied().cycle().take(self.iv_size).collect()
    }

    fn keystream_apply(iv: &[u8], data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, &b)| b ^ iv[i % iv.len()] ^ 0x5A)
            .collect()
    }
}

impl CryptoService for XorService {
    fn encrypt(&self, _key_type: &str, plaintext: &[u8]) -> SResult<Vec<u8>> {
        let iv = self.next_iv();
        let ciphertext = Self::keystream_apply(&iv, plaintext);
        Ok(envelope::wrap(&iv, &ciphertext))
    }

    fn decrypt(&self, _key_type: &str, data: &[u8]) -> SResult<Zeroizing<Vec<u8>>> {
        let (iv, ciphertext) = envelope::unwrap(data, self.iv_size)?;
        Ok(Zeroizing::new(Self::keystream_apply(iv, ciphertext)))
    }
}

/// A service whose key lookup always fails.
pub(crate) struct FailingService;

impl CryptoService for FailingService {
    fn encrypt(&self, _key_type: &str, _plaintext: &[u8]) -> SResult<Vec<u8>> {
        Err(HsmError::KeyNotFound("kgk".to_owned()).into())
    }

    fn decrypt(&self, _key_type: &str, _data: &[u8]) -> SResult<Zeroizing<Vec<u8>>> {
        Err(HsmError::KeyNotFound("kgk".to_owned()).into())
    }
}
