use std::ptr;

use pkcs11_sys::{
    CK_ATTRIBUTE, CK_ATTRIBUTE_PTR, CK_BBOOL, CK_FALSE, CK_KEY_TYPE, CK_MECHANISM,
    CK_MECHANISM_PTR, CK_OBJECT_CLASS, CK_OBJECT_HANDLE, CK_TRUE, CK_ULONG, CKA_CLASS,
    CKA_DECRYPT, CKA_ENCRYPT, CKA_EXTRACTABLE, CKA_KEY_TYPE, CKA_LABEL, CKA_SENSITIVE, CKA_TOKEN,
    CKA_VALUE_LEN, CKK_AES, CKM_AES_KEY_GEN, CKO_SECRET_KEY,
};
use tracing::info;

use crate::{HResult, HsmError, aes_key_template, hsm_call, session::Session};

#[derive(Debug, Clone, Copy)]
pub enum AesKeySize {
    Aes128,
    Aes256,
}

impl Session {
    /// Generate a token-resident AES key under `label`.
    ///
    /// The key is usable for encrypt and decrypt; `sensitive` controls
    /// whether the raw value may ever leave the module. Provisioning
    /// operation, never called on the request path.
    pub fn generate_aes_key(
        &self,
        label: &str,
        size: AesKeySize,
        sensitive: bool,
    ) -> HResult<CK_OBJECT_HANDLE> {
        let size = CK_ULONG::try_from(match size {
            AesKeySize::Aes128 => 16_usize,
            AesKeySize::Aes256 => 32_usize,
        })
        .map_err(|e| HsmError::Create(format!("AES key size conversion failed: {e}")))?;
        let mut mechanism = CK_MECHANISM {
            mechanism: CKM_AES_KEY_GEN,
            pParameter: ptr::null_mut(),
            ulParameterLen: 0,
        };
        let is_sensitive: CK_BBOOL = if sensitive { CK_TRUE } else { CK_FALSE };
        let mut template = aes_key_template!(label, size, is_sensitive);
        let p_mechanism: CK_MECHANISM_PTR = &raw mut mechanism;
        let p_template: CK_ATTRIBUTE_PTR = template.as_mut_ptr();
        let mut aes_key_handle = CK_OBJECT_HANDLE::default();
        hsm_call!(
            self.hsm(),
            HsmError::Create,
            "failed generating an AES key",
            C_GenerateKey,
            self.session_handle(),
            p_mechanism,
            p_template,
            CK_ULONG::try_from(template.len())?,
            &raw mut aes_key_handle
        );
        info!("generated AES key {label}");
        self.object_handles_cache()
            .insert(CKO_SECRET_KEY, label.as_bytes().to_vec(), aes_key_handle)?;
        Ok(aes_key_handle)
    }
}
