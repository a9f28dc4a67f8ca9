use std::{
    ffi::CStr,
    fmt,
    fmt::{Display, Formatter},
    ptr,
    sync::Arc,
};

use libloading::Library;
use pkcs11_sys::{
    CK_C_CloseSession, CK_C_Decrypt, CK_C_DecryptInit, CK_C_DestroyObject, CK_C_Encrypt,
    CK_C_EncryptInit, CK_C_Finalize, CK_C_FindObjects, CK_C_FindObjectsFinal,
    CK_C_FindObjectsInit, CK_C_GenerateKey, CK_C_GenerateRandom, CK_C_GetInfo,
    CK_C_INITIALIZE_ARGS, CK_C_Initialize, CK_C_Login, CK_C_Logout, CK_C_OpenSession,
    CK_FLAGS, CK_INFO, CK_SESSION_HANDLE, CK_SLOT_ID, CK_ULONG, CK_UTF8CHAR_PTR,
    CKF_OS_LOCKING_OK, CKF_RW_SESSION, CKF_SERIAL_SESSION, CKR_OK, CKR_USER_ALREADY_LOGGED_IN,
    CKU_USER,
};
use tracing::{debug, warn};

use crate::{HResult, HsmError, ObjectHandlesCache, Session};

/// Dynamically loaded PKCS#11 library.
///
/// Holds the resolved `C_*` entry points; the `Library` is kept alive for as
/// long as any pointer may be called. `C_Finalize` runs on drop.
#[allow(dead_code)]
pub(crate) struct HsmLib {
    _library: Library,
    pub(crate) C_Initialize: CK_C_Initialize,
    pub(crate) C_Finalize: CK_C_Finalize,
    pub(crate) C_GetInfo: CK_C_GetInfo,

    pub(crate) C_OpenSession: CK_C_OpenSession,
    pub(crate) C_CloseSession: CK_C_CloseSession,
    pub(crate) C_Login: CK_C_Login,
    pub(crate) C_Logout: CK_C_Logout,

    pub(crate) C_GenerateKey: CK_C_GenerateKey,
    pub(crate) C_GenerateRandom: CK_C_GenerateRandom,
    pub(crate) C_DestroyObject: CK_C_DestroyObject,

    pub(crate) C_FindObjectsInit: CK_C_FindObjectsInit,
    pub(crate) C_FindObjects: CK_C_FindObjects,
    pub(crate) C_FindObjectsFinal: CK_C_FindObjectsFinal,

    pub(crate) C_EncryptInit: CK_C_EncryptInit,
    pub(crate) C_Encrypt: CK_C_Encrypt,
    pub(crate) C_DecryptInit: CK_C_DecryptInit,
    pub(crate) C_Decrypt: CK_C_Decrypt,
}

impl HsmLib {
    fn instantiate<P>(path: P) -> HResult<Self>
    where
        P: AsRef<std::ffi::OsStr>,
    {
        unsafe {
            let library = Library::new(path)?;
            let hsm_lib = Self {
                C_Initialize: Some(*library.get(b"C_Initialize")?),
                C_Finalize: Some(*library.get(b"C_Finalize")?),
                C_GetInfo: Some(*library.get(b"C_GetInfo")?),
                C_OpenSession: Some(*library.get(b"C_OpenSession")?),
                C_CloseSession: Some(*library.get(b"C_CloseSession")?),
                C_Login: Some(*library.get(b"C_Login")?),
                C_Logout: Some(*library.get(b"C_Logout")?),
                C_GenerateKey: Some(*library.get(b"C_GenerateKey")?),
                C_GenerateRandom: Some(*library.get(b"C_GenerateRandom")?),
                C_DestroyObject: Some(*library.get(b"C_DestroyObject")?),
                C_FindObjectsInit: Some(*library.get(b"C_FindObjectsInit")?),
                C_FindObjects: Some(*library.get(b"C_FindObjects")?),
                C_FindObjectsFinal: Some(*library.get(b"C_FindObjectsFinal")?),
                C_EncryptInit: Some(*library.get(b"C_EncryptInit")?),
                C_Encrypt: Some(*library.get(b"C_Encrypt")?),
                C_DecryptInit: Some(*library.get(b"C_DecryptInit")?),
                C_Decrypt: Some(*library.get(b"C_Decrypt")?),
                // we need to keep the library alive
                _library: library,
            };
            Self::initialize(&hsm_lib)?;
            Ok(hsm_lib)
        }
    }

    fn initialize(hsm_lib: &Self) -> HResult<()> {
        let pInitArgs = CK_C_INITIALIZE_ARGS {
            CreateMutex: None,
            DestroyMutex: None,
            LockMutex: None,
            UnlockMutex: None,
            flags: CKF_OS_LOCKING_OK,
            pReserved: ptr::null_mut(),
        };
        #[allow(unsafe_code)]
        let rv = unsafe {
            hsm_lib.C_Initialize.ok_or_else(|| {
                HsmError::Init("C_Initialize not available on library".to_owned())
            })?(ptr::from_ref(&pInitArgs).cast::<std::ffi::c_void>().cast_mut())
        };
        if rv != CKR_OK {
            return Err(HsmError::Init(format!(
                "failed initializing the module: CKR=0x{rv:08X}"
            )));
        }
        Ok(())
    }

    fn finalize(&self) -> HResult<()> {
        #[allow(unsafe_code)]
        let rv = unsafe {
            self.C_Finalize.ok_or_else(|| {
                HsmError::Init("C_Finalize not available on library".to_owned())
            })?(ptr::null_mut())
        };
        if rv != CKR_OK {
            return Err(HsmError::Init(format!(
                "failed finalizing the module: CKR=0x{rv:08X}"
            )));
        }
        Ok(())
    }
}

impl Drop for HsmLib {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

/// Handle to an initialized PKCS#11 module.
///
/// Created once at startup; `open_slot` yields the authenticated [`Session`]
/// the gateway holds for its whole lifetime.
pub struct Hsm {
    hsm_lib: Arc<HsmLib>,
}

impl Hsm {
    /// Load the PKCS#11 library at `path` and initialize it.
    pub fn instantiate<P>(path: P) -> HResult<Self>
    where
        P: AsRef<std::ffi::OsStr>,
    {
        let hsm_lib = Arc::new(HsmLib::instantiate(path)?);
        Ok(Self { hsm_lib })
    }

    /// Open a read/write serial session on `slot_id` and log in with `pin`
    /// when one is provided.
    ///
    /// The returned session is the single owner of the underlying handle and
    /// must be closed exactly once; [`Session`] enforces this.
    pub fn open_slot(&self, slot_id: usize, pin: Option<String>) -> HResult<Session> {
        let slot_id = CK_SLOT_ID::try_from(slot_id)
            .map_err(|e| HsmError::Session(format!("invalid slot id: {e}")))?;
        let flags: CK_FLAGS = CKF_SERIAL_SESSION | CKF_RW_SESSION;
        let mut session_handle: CK_SESSION_HANDLE = 0;

        #[allow(unsafe_code)]
        let rv = unsafe {
            self.hsm_lib.C_OpenSession.ok_or_else(|| {
                HsmError::Init("C_OpenSession not available on library".to_owned())
            })?(
                slot_id,
                flags,
                ptr::null_mut(),
                None,
                &raw mut session_handle,
            )
        };
        if rv != CKR_OK {
            return Err(HsmError::Session(format!(
                "failed opening a session on slot {slot_id}: CKR=0x{rv:08X}"
            )));
        }
        debug!("opened session {session_handle} on slot {slot_id}");

        let logged_in = if let Some(pin) = pin {
            let mut pin_bytes = pin.into_bytes();
            #[allow(unsafe_code)]
            let rv = unsafe {
                self.hsm_lib.C_Login.ok_or_else(|| {
                    HsmError::Init("C_Login not available on library".to_owned())
                })?(
                    session_handle,
                    CKU_USER,
                    pin_bytes.as_mut_ptr() as CK_UTF8CHAR_PTR,
                    CK_ULONG::try_from(pin_bytes.len())?,
                )
            };
            if rv == CKR_USER_ALREADY_LOGGED_IN {
                warn!("user already logged in, ignoring login");
            } else if rv != CKR_OK {
                return Err(HsmError::Auth(format!(
                    "failed logging in to slot {slot_id}: CKR=0x{rv:08X}"
                )));
            }
            true
        } else {
            false
        };

        Ok(Session::new(
            self.hsm_lib.clone(),
            session_handle,
            Arc::new(ObjectHandlesCache::new()),
            logged_in,
        ))
    }

    /// Query module information, mainly for the startup log.
    pub fn get_info(&self) -> HResult<Info> {
        let mut info = CK_INFO::default();
        #[allow(unsafe_code)]
        let rv = unsafe {
            self.hsm_lib.C_GetInfo.ok_or_else(|| {
                HsmError::Init("C_GetInfo not available on library".to_owned())
            })?(&raw mut info)
        };
        if rv != CKR_OK {
            return Err(HsmError::Init(format!(
                "failed getting module info: CKR=0x{rv:08X}"
            )));
        }
        Ok(info.into())
    }
}

/// Module information as reported by `C_GetInfo`.
pub struct Info {
    pub cryptoki_version: (u8, u8),
    pub manufacturer_id: String,
    pub library_description: String,
    pub library_version: (u8, u8),
}

impl From<CK_INFO> for Info {
    fn from(info: CK_INFO) -> Self {
        // PKCS#11 strings are space padded, not nul terminated
        let text = |bytes: &[u8]| {
            CStr::from_bytes_until_nul(bytes)
                .map_or_else(
                    |_| String::from_utf8_lossy(bytes).to_string(),
                    |s| s.to_string_lossy().to_string(),
                )
                .trim_end()
                .to_string()
        };
        Self {
            cryptoki_version: (info.cryptokiVersion.major, info.cryptokiVersion.minor),
            manufacturer_id: text(&info.manufacturerID),
            library_description: text(&info.libraryDescription),
            library_version: (info.libraryVersion.major, info.libraryVersion.minor),
        }
    }
}

impl Display for Info {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}.{} (Cryptoki {}.{})",
            self.manufacturer_id,
            self.library_description,
            self.library_version.0,
            self.library_version.1,
            self.cryptoki_version.0,
            self.cryptoki_version.1
        )
    }
}
