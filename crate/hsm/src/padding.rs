//! PKCS#7 padding for the raw block modes.
//!
//! `CKM_AES_ECB` and `CKM_AES_CBC` only accept inputs aligned to the cipher
//! block; callers pad before encrypting and unpad after decrypting. The
//! padded-mode mechanism (`CKM_AES_CBC_PAD`) does this inside the module and
//! must not be combined with these functions.

use zeroize::Zeroizing;

use crate::{HResult, HsmError};

/// Append PKCS#7 padding in place so `data.len()` becomes a multiple of
/// `block_size`. A full extra block is appended when the input is already
/// aligned.
pub fn pkcs7_pad(data: &mut Vec<u8>, block_size: usize) -> HResult<()> {
    if block_size == 0 || block_size > 255 {
        return Err(HsmError::Padding(format!(
            "block size must be between 1 and 255, got {block_size}"
        )));
    }
    if data.is_empty() {
        return Err(HsmError::Padding("empty input".to_owned()));
    }
    let pad_len = block_size - (data.len() % block_size);
    let pad_byte = u8::try_from(pad_len)
        .map_err(|e| HsmError::Padding(format!("padding length {pad_len} exceeds a byte: {e}")))?;
    data.resize(data.len() + pad_len, pad_byte);
    Ok(())
}

/// Verify and strip PKCS#7 padding.
///
/// The input reaches this function from network-supplied ciphertext, so every
/// inconsistency is a recoverable [`HsmError::Padding`], never a panic.
pub fn pkcs7_unpad(data: Zeroizing<Vec<u8>>, block_size: usize) -> HResult<Zeroizing<Vec<u8>>> {
    if block_size == 0 || block_size > 255 {
        return Err(HsmError::Padding(format!(
            "block size must be between 1 and 255, got {block_size}"
        )));
    }
    if data.is_empty() {
        return Err(HsmError::Padding("empty input".to_owned()));
    }
    if !data.len().is_multiple_of(block_size) {
        return Err(HsmError::Padding(
            "input does not align to blocks".to_owned(),
        ));
    }
    let pad_len = usize::from(*data.last().ok_or_else(|| {
        HsmError::Padding("empty input".to_owned())
    })?);
    if pad_len == 0 || pad_len > data.len() || pad_len > block_size {
        return Err(HsmError::Padding("padding length out of range".to_owned()));
    }
    let tail = data
        .get(data.len() - pad_len..)
        .ok_or_else(|| HsmError::Padding("padding length out of range".to_owned()))?;
    if !tail.iter().all(|&b| usize::from(b) == pad_len) {
        return Err(HsmError::Padding("padding bytes are corrupt".to_owned()));
    }
    let new_len = data.len() - pad_len;
    let mut unpadded = data;
    unpadded.truncate(new_len);
    Ok(unpadded)
}

#[cfg(test)]
mod tests {
    use zeroize::Zeroizing;

    use super::{pkcs7_pad, pkcs7_unpad};
    use crate::HsmError;

    #[test]
    fn pad_then_unpad_restores_input() {
        for block_size in [16_usize, 32] {
            for len in 1..=3 * block_size {
                let mut data: Vec<u8> = (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect();
                let original = data.clone();
                pkcs7_pad(&mut data, block_size).unwrap();
                assert!(data.len().is_multiple_of(block_size));
                assert!(data.len() > original.len());
                let unpadded = pkcs7_unpad(Zeroizing::new(data), block_size).unwrap();
                assert_eq!(unpadded.as_slice(), original.as_slice());
            }
        }
    }

    #[test]
    fn aligned_input_gets_a_full_extra_block() {
        let mut data = vec![0xAB; 32];
        pkcs7_pad(&mut data, 32).unwrap();
        assert_eq!(data.len(), 64);
        assert!(data[32..].iter().all(|&b| b == 32));
    }

    #[test]
    fn pad_rejects_empty_input_and_bad_block_size() {
        assert!(matches!(
            pkcs7_pad(&mut Vec::new(), 16),
            Err(HsmError::Padding(_))
        ));
        assert!(matches!(
            pkcs7_pad(&mut vec![1], 0),
            Err(HsmError::Padding(_))
        ));
        assert!(matches!(
            pkcs7_pad(&mut vec![1], 256),
            Err(HsmError::Padding(_))
        ));
    }

    #[test]
    fn unpad_rejects_corrupt_padding() {
        // count larger than the buffer
        let data = Zeroizing::new(vec![0x11; 15].into_iter().chain([0xFF]).collect::<Vec<u8>>());
        assert!(matches!(pkcs7_unpad(data, 16), Err(HsmError::Padding(_))));

        // zero count
        let data = Zeroizing::new(vec![0x11; 15].into_iter().chain([0x00]).collect::<Vec<u8>>());
        assert!(matches!(pkcs7_unpad(data, 16), Err(HsmError::Padding(_))));

        // inconsistent pad bytes
        let mut bytes = vec![0x11; 12];
        bytes.extend([0x03, 0x04, 0x04, 0x04]);
        assert!(matches!(
            pkcs7_unpad(Zeroizing::new(bytes), 16),
            Err(HsmError::Padding(_))
        ));

        // unaligned input
        let data = Zeroizing::new(vec![0x02, 0x02, 0x02]);
        assert!(matches!(pkcs7_unpad(data, 16), Err(HsmError::Padding(_))));
    }
}
