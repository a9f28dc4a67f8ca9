//! PKCS#11 session and cipher operations.
//!
//! A [`Session`] is an authenticated connection to one slot. It is the single
//! owner of its handle: `close` consumes it and logs out exactly once, and a
//! drop guard releases the handle on paths that never reach an explicit
//! close. All operations are blocking calls into the vendor library; callers
//! that share a session across threads must serialize access themselves.

use std::{ptr, sync::Arc};

use pkcs11_sys::{
    CK_ATTRIBUTE, CK_MECHANISM, CK_MECHANISM_TYPE, CK_OBJECT_CLASS, CK_OBJECT_HANDLE,
    CK_SESSION_HANDLE, CK_ULONG, CKA_CLASS, CKA_LABEL, CKM_AES_CBC, CKM_AES_CBC_PAD, CKM_AES_ECB,
    CKO_PRIVATE_KEY, CKO_PUBLIC_KEY, CKO_SECRET_KEY,
};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::{HResult, HsmError, ObjectHandlesCache, hsm_call, hsm_lib::HsmLib};

/// AES block size in bytes
pub(crate) const AES_BLOCK_SIZE: usize = 16;

/// Upper bound per `C_FindObjects` round
const FIND_MAX_OBJECT_COUNT: usize = 16;

/// Object class of a key, as used in search templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Secret,
    Public,
    Private,
}

impl KeyClass {
    pub(crate) const fn object_class(self) -> CK_OBJECT_CLASS {
        match self {
            Self::Secret => CKO_SECRET_KEY,
            Self::Public => CKO_PUBLIC_KEY,
            Self::Private => CKO_PRIVATE_KEY,
        }
    }
}

/// Block cipher mechanism selector.
///
/// The raw modes (`AesEcb`, `AesCbc`) leave padding to the caller: inputs
/// must already be a multiple of the AES block size. `AesCbcPad` pads inside
/// the module and accepts any input length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    AesEcb,
    AesCbc,
    AesCbcPad,
}

impl CipherMode {
    const fn mechanism_type(self) -> CK_MECHANISM_TYPE {
        match self {
            Self::AesEcb => CKM_AES_ECB,
            Self::AesCbc => CKM_AES_CBC,
            Self::AesCbcPad => CKM_AES_CBC_PAD,
        }
    }

    /// Whether the mechanism takes an IV parameter. ECB has no chaining and
    /// ignores any IV handed to the higher layers.
    const fn uses_iv(self) -> bool {
        !matches!(self, Self::AesEcb)
    }

    /// Whether the module applies PKCS#7 padding itself.
    #[must_use]
    pub const fn pads_internally(self) -> bool {
        matches!(self, Self::AesCbcPad)
    }
}

/// A logged-in session with one HSM slot.
pub struct Session {
    hsm: Arc<HsmLib>,
    handle: CK_SESSION_HANDLE,
    object_handles_cache: Arc<ObjectHandlesCache>,
    logged_in: bool,
    closed: bool,
}

impl Session {
    pub(crate) fn new(
        hsm: Arc<HsmLib>,
        handle: CK_SESSION_HANDLE,
        object_handles_cache: Arc<ObjectHandlesCache>,
        logged_in: bool,
    ) -> Self {
        debug!("new session {handle}, logged in: {logged_in}");
        Self {
            hsm,
            handle,
            object_handles_cache,
            logged_in,
            closed: false,
        }
    }

    pub(crate) fn hsm(&self) -> Arc<HsmLib> {
        self.hsm.clone()
    }

    pub(crate) const fn session_handle(&self) -> CK_SESSION_HANDLE {
        self.handle
    }

    pub(crate) fn object_handles_cache(&self) -> Arc<ObjectHandlesCache> {
        self.object_handles_cache.clone()
    }

    /// Log out (when logged in) and close the session.
    ///
    /// Consumes the session: the underlying module does not tolerate a double
    /// close, so release can only ever be attempted once.
    pub fn close(mut self) -> HResult<()> {
        self.release()
    }

    fn release(&mut self) -> HResult<()> {
        if self.closed {
            return Ok(());
        }
        // mark released before calling out: a failed logout must not lead to
        // a second close attempt from the drop guard
        self.closed = true;
        if self.logged_in {
            hsm_call!(
                self.hsm,
                HsmError::Session,
                "failed logging out",
                C_Logout,
                self.handle
            );
        }
        hsm_call!(
            self.hsm,
            HsmError::Session,
            "failed closing the session",
            C_CloseSession,
            self.handle
        );
        debug!("closed session {}", self.handle);
        Ok(())
    }

    /// Draw `len` random bytes from the module RNG.
    pub fn generate_random(&self, len: usize) -> HResult<Vec<u8>> {
        let mut values = vec![0_u8; len];
        hsm_call!(
            self.hsm,
            HsmError::Random,
            "failed generating random data",
            C_GenerateRandom,
            self.handle,
            values.as_mut_ptr(),
            CK_ULONG::try_from(len)?
        );
        Ok(values)
    }

    /// Generate a fresh initialization vector of `len` bytes.
    pub fn generate_iv(&self, len: usize) -> HResult<Vec<u8>> {
        if len == 0 {
            return Err(HsmError::Random("IV length must be positive".to_owned()));
        }
        self.generate_random(len)
    }

    /// Locate a key by class and label.
    ///
    /// Zero matches is [`HsmError::KeyNotFound`]. Labels are not unique on
    /// the token; when several objects match, the first handle returned by
    /// the module is taken as canonical. Resolved handles are cached.
    pub fn find_key(&self, class: KeyClass, label: &str) -> HResult<CK_OBJECT_HANDLE> {
        let object_class = class.object_class();
        if let Some(handle) = self.object_handles_cache.get(object_class, label.as_bytes())? {
            return Ok(handle);
        }

        let template = [
            CK_ATTRIBUTE {
                type_: CKA_CLASS,
                pValue: ptr::from_ref(&object_class)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_OBJECT_CLASS>())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_LABEL,
                pValue: label.as_ptr().cast::<std::ffi::c_void>().cast_mut(),
                ulValueLen: CK_ULONG::try_from(label.len())?,
            },
        ];
        let handles = self.find_object_handles(template.to_vec())?;
        let handle = *handles
            .first()
            .ok_or_else(|| HsmError::KeyNotFound(label.to_owned()))?;
        if handles.len() > 1 {
            debug!(
                "{} objects share the label {label}, using the first handle",
                handles.len()
            );
        }

        self.object_handles_cache
            .insert(object_class, label.as_bytes().to_vec(), handle)?;
        Ok(handle)
    }

    fn find_object_handles(
        &self,
        mut template: Vec<CK_ATTRIBUTE>,
    ) -> HResult<Vec<CK_OBJECT_HANDLE>> {
        let mut object_handles: Vec<CK_OBJECT_HANDLE> = Vec::new();
        hsm_call!(
            self.hsm,
            HsmError::Crypto,
            "failed to initialize the object search",
            C_FindObjectsInit,
            self.handle,
            template.as_mut_ptr(),
            CK_ULONG::try_from(template.len())?
        );

        let mut handles_buf = [CK_OBJECT_HANDLE::default(); FIND_MAX_OBJECT_COUNT];
        let mut object_count: CK_ULONG = 0;
        loop {
            hsm_call!(
                self.hsm,
                HsmError::Crypto,
                "failed to find objects",
                C_FindObjects,
                self.handle,
                handles_buf.as_mut_ptr(),
                CK_ULONG::try_from(FIND_MAX_OBJECT_COUNT)?,
                &raw mut object_count
            );
            if object_count == 0 {
                break;
            }
            trace!("found {object_count} objects");
            let returned = usize::try_from(object_count)?;
            object_handles.extend_from_slice(handles_buf.get(..returned).ok_or_else(|| {
                HsmError::Crypto("more objects returned than requested".to_owned())
            })?);
        }
        hsm_call!(
            self.hsm,
            HsmError::Crypto,
            "failed to finalize the object search",
            C_FindObjectsFinal,
            self.handle
        );
        Ok(object_handles)
    }

    /// Remove an object from the token. Irreversible.
    pub fn destroy_object(&self, object_handle: CK_OBJECT_HANDLE) -> HResult<()> {
        hsm_call!(
            self.hsm,
            HsmError::Destroy,
            "failed to destroy the object",
            C_DestroyObject,
            self.handle,
            object_handle
        );
        Ok(())
    }

    /// Drop a cached handle, e.g. after destroying the object behind it.
    pub fn forget_handle(&self, class: KeyClass, label: &str) -> HResult<()> {
        self.object_handles_cache
            .remove(class.object_class(), label.as_bytes())
    }

    /// Encrypt `plaintext` under `key_handle` with the given mechanism.
    ///
    /// CBC modes require a block-sized IV; raw modes additionally require
    /// the input to be aligned to the AES block (the caller pads).
    pub fn encrypt(
        &self,
        key_handle: CK_OBJECT_HANDLE,
        mode: CipherMode,
        iv: &[u8],
        plaintext: &[u8],
    ) -> HResult<Vec<u8>> {
        let mut iv_buf = Self::check_iv(mode, iv)?;
        if !mode.pads_internally() && !plaintext.len().is_multiple_of(AES_BLOCK_SIZE) {
            return Err(HsmError::Crypto(format!(
                "{mode:?} input of {} bytes is not a multiple of the {AES_BLOCK_SIZE}-byte block",
                plaintext.len()
            )));
        }
        let mut mechanism = Self::mechanism(mode, iv_buf.as_deref_mut());
        self.encrypt_with_mechanism(key_handle, &mut mechanism, plaintext)
    }

    /// Decrypt `ciphertext` under `key_handle` with the given mechanism.
    pub fn decrypt(
        &self,
        key_handle: CK_OBJECT_HANDLE,
        mode: CipherMode,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> HResult<Zeroizing<Vec<u8>>> {
        let mut iv_buf = Self::check_iv(mode, iv)?;
        if !ciphertext.len().is_multiple_of(AES_BLOCK_SIZE) {
            return Err(HsmError::Crypto(format!(
                "{mode:?} ciphertext of {} bytes is not a multiple of the {AES_BLOCK_SIZE}-byte \
                 block",
                ciphertext.len()
            )));
        }
        let mut mechanism = Self::mechanism(mode, iv_buf.as_deref_mut());
        self.decrypt_with_mechanism(key_handle, &mut mechanism, ciphertext)
    }

    /// Validate the IV for the mechanism and return an owned, mutable copy
    /// (the C interface takes the parameter by mutable pointer).
    fn check_iv(mode: CipherMode, iv: &[u8]) -> HResult<Option<Vec<u8>>> {
        if !mode.uses_iv() {
            return Ok(None);
        }
        if iv.len() != AES_BLOCK_SIZE {
            return Err(HsmError::Crypto(format!(
                "{mode:?} requires a {AES_BLOCK_SIZE}-byte IV, got {} bytes",
                iv.len()
            )));
        }
        Ok(Some(iv.to_vec()))
    }

    fn mechanism(mode: CipherMode, iv_buf: Option<&mut [u8]>) -> CK_MECHANISM {
        match iv_buf {
            Some(iv) => CK_MECHANISM {
                mechanism: mode.mechanism_type(),
                pParameter: iv.as_mut_ptr().cast::<std::ffi::c_void>(),
                ulParameterLen: iv.len() as CK_ULONG,
            },
            None => CK_MECHANISM {
                mechanism: mode.mechanism_type(),
                pParameter: ptr::null_mut(),
                ulParameterLen: 0,
            },
        }
    }

    fn encrypt_with_mechanism(
        &self,
        key_handle: CK_OBJECT_HANDLE,
        mechanism: &mut CK_MECHANISM,
        data: &[u8],
    ) -> HResult<Vec<u8>> {
        let mut data = data.to_vec();
        hsm_call!(
            self.hsm,
            HsmError::Crypto,
            "failed to initialize encryption",
            C_EncryptInit,
            self.handle,
            mechanism,
            key_handle
        );

        let mut encrypted_data_len: CK_ULONG = 0;
        hsm_call!(
            self.hsm,
            HsmError::Crypto,
            "failed to get the encrypted data length",
            C_Encrypt,
            self.handle,
            data.as_mut_ptr(),
            CK_ULONG::try_from(data.len())?,
            ptr::null_mut(),
            &raw mut encrypted_data_len
        );

        let mut encrypted_data = vec![0_u8; usize::try_from(encrypted_data_len)?];
        hsm_call!(
            self.hsm,
            HsmError::Crypto,
            "failed to encrypt data",
            C_Encrypt,
            self.handle,
            data.as_mut_ptr(),
            CK_ULONG::try_from(data.len())?,
            encrypted_data.as_mut_ptr(),
            &raw mut encrypted_data_len
        );

        encrypted_data.truncate(usize::try_from(encrypted_data_len)?);
        Ok(encrypted_data)
    }

    fn decrypt_with_mechanism(
        &self,
        key_handle: CK_OBJECT_HANDLE,
        mechanism: &mut CK_MECHANISM,
        encrypted_data: &[u8],
    ) -> HResult<Zeroizing<Vec<u8>>> {
        let mut encrypted_data = encrypted_data.to_vec();
        hsm_call!(
            self.hsm,
            HsmError::Crypto,
            "failed to initialize decryption",
            C_DecryptInit,
            self.handle,
            mechanism,
            key_handle
        );

        let mut decrypted_data_len: CK_ULONG = 0;
        hsm_call!(
            self.hsm,
            HsmError::Crypto,
            "failed to get the decrypted data length",
            C_Decrypt,
            self.handle,
            encrypted_data.as_mut_ptr(),
            CK_ULONG::try_from(encrypted_data.len())?,
            ptr::null_mut(),
            &raw mut decrypted_data_len
        );

        let mut decrypted_data = vec![0_u8; usize::try_from(decrypted_data_len)?];
        hsm_call!(
            self.hsm,
            HsmError::Crypto,
            "failed to decrypt data",
            C_Decrypt,
            self.handle,
            encrypted_data.as_mut_ptr(),
            CK_ULONG::try_from(encrypted_data.len())?,
            decrypted_data.as_mut_ptr(),
            &raw mut decrypted_data_len
        );

        decrypted_data.truncate(usize::try_from(decrypted_data_len)?);
        Ok(Zeroizing::new(decrypted_data))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
