#![allow(non_snake_case)]

mod cache;
pub mod envelope;
mod error;
mod hsm_lib;
pub mod padding;
mod session;


pub use cache::ObjectHandlesCache;
pub use error::{HResult, HsmError};
pub use hsm_lib::{Hsm, Info};
pub use pkcs11_sys;
pub use session::{AesKeySize, CipherMode, KeyClass, Session};

/// Resolve a PKCS#11 entry point on the loaded library, call it, and map a
/// non-`CKR_OK` return value to the given error variant.
///
/// A macro is used here to ensure inline expansion due to mutable pointer
/// parameters.
#[macro_export]
macro_rules! hsm_call {
    ($hsm:expr, $variant:path, $msg:expr, $func:ident $(, $arg:expr)* $(,)?) => {{
        #[allow(unsafe_code)]
        let rv = unsafe {
            $hsm.$func.ok_or_else(|| {
                $crate::HsmError::Init(format!(
                    "{} not available on library",
                    stringify!($func)
                ))
            })?($($arg),*)
        };
        if rv != $crate::pkcs11_sys::CKR_OK {
            return Err($variant(format!("{}: CKR=0x{rv:08X}", $msg)));
        }
    }};
}

/// Attribute template for a token-resident AES key usable for encrypt and
/// decrypt. The referenced values must outlive the `C_GenerateKey` call.
#[macro_export]
macro_rules! aes_key_template {
    ($label:expr, $size:expr, $sensitive:expr) => {
        [
            CK_ATTRIBUTE {
                type_: CKA_CLASS,
                pValue: std::ptr::from_ref(&CKO_SECRET_KEY)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_OBJECT_CLASS>())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_KEY_TYPE,
                pValue: std::ptr::from_ref(&CKK_AES)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_KEY_TYPE>())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_LABEL,
                pValue: $label.as_ptr().cast::<std::ffi::c_void>().cast_mut(),
                ulValueLen: CK_ULONG::try_from($label.len())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_TOKEN,
                pValue: std::ptr::from_ref(&CK_TRUE)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_BBOOL>())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_ENCRYPT,
                pValue: std::ptr::from_ref(&CK_TRUE)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_BBOOL>())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_DECRYPT,
                pValue: std::ptr::from_ref(&CK_TRUE)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_BBOOL>())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_SENSITIVE,
                pValue: std::ptr::from_ref(&$sensitive)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_BBOOL>())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_EXTRACTABLE,
                pValue: std::ptr::from_ref(&CK_TRUE)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_BBOOL>())?,
            },
            CK_ATTRIBUTE {
                type_: CKA_VALUE_LEN,
                pValue: std::ptr::from_ref(&$size)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
                ulValueLen: CK_ULONG::try_from(size_of::<CK_ULONG>())?,
            },
        ]
    };
}
