mod aes;
mod session_impl;

pub use aes::AesKeySize;
pub use session_impl::{CipherMode, KeyClass, Session};
