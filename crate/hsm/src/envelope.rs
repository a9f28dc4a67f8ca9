//! IV envelope codec.
//!
//! A ciphertext travels with the IV that produced it, prepended with no
//! length prefix: the IV size is a shared deployment constant, and both ends
//! of the exchange are this same service. `len(envelope) == iv_size +
//! len(ciphertext)` always holds for a wrapped value.

use crate::{HResult, HsmError};

/// Bind an IV to its ciphertext: `iv ‖ ciphertext`.
#[must_use]
pub fn wrap(iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut envelope = Vec::with_capacity(iv.len() + ciphertext.len());
    envelope.extend_from_slice(iv);
    envelope.extend_from_slice(ciphertext);
    envelope
}

/// Split an envelope back into `(iv, ciphertext)`.
///
/// Fails with [`HsmError::Format`] when the envelope cannot carry an
/// `iv_size`-byte prefix.
pub fn unwrap(envelope: &[u8], iv_size: usize) -> HResult<(&[u8], &[u8])> {
    if envelope.len() < iv_size {
        return Err(HsmError::Format(format!(
            "envelope of {} bytes is shorter than the {iv_size}-byte IV",
            envelope.len()
        )));
    }
    Ok(envelope.split_at(iv_size))
}

#[cfg(test)]
mod tests {
    use super::{unwrap, wrap};
    use crate::HsmError;

    #[test]
    fn wrap_then_unwrap_restores_parts() {
        let iv = [7_u8; 16];
        let ciphertext = b"0123456789abcdef0123456789abcdef";
        let envelope = wrap(&iv, ciphertext);
        assert_eq!(envelope.len(), iv.len() + ciphertext.len());
        let (iv_out, ciphertext_out) = unwrap(&envelope, iv.len()).unwrap();
        assert_eq!(iv_out, iv);
        assert_eq!(ciphertext_out, ciphertext);
    }

    #[test]
    fn empty_ciphertext_round_trips() {
        let iv = [1_u8; 16];
        let envelope = wrap(&iv, &[]);
        let (iv_out, ciphertext_out) = unwrap(&envelope, 16).unwrap();
        assert_eq!(iv_out, iv);
        assert!(ciphertext_out.is_empty());
    }

    #[test]
    fn short_envelope_is_rejected() {
        let envelope = vec![0_u8; 15];
        assert!(matches!(unwrap(&envelope, 16), Err(HsmError::Format(_))));
    }
}
