//! Request and response formats of the encrypt/decrypt operations, shared by
//! the HTTP and socket transports.

use serde::{Deserialize, Serialize};

/// Four-digit result code carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Operation completed
    #[serde(rename = "0000")]
    Success,
    /// The request envelope could not be decoded
    #[serde(rename = "1111")]
    MalformedRequest,
    /// The payload is not valid base64
    #[serde(rename = "2222")]
    MalformedPayload,
    /// Key lookup, cipher or padding failure
    #[serde(rename = "3333")]
    OperationFailed,
}

pub const SUCCESS_MESSAGE: &str = "success";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptRequest {
    #[serde(default)]
    pub r#type: String,
    /// base64-encoded plaintext
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    /// base64-encoded IV-bound ciphertext
    pub cipher_text: String,
}

impl EncryptResponse {
    #[must_use]
    pub fn success(cipher_text: String) -> Self {
        Self {
            error_code: ErrorCode::Success,
            error_message: SUCCESS_MESSAGE.to_owned(),
            cipher_text,
        }
    }

    #[must_use]
    pub fn failure(error_code: ErrorCode, error_message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_message: error_message.into(),
            cipher_text: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    #[serde(default)]
    pub r#type: String,
    /// base64-encoded IV-bound ciphertext
    #[serde(default)]
    pub cipher_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    /// base64-encoded plaintext
    pub plain_text: String,
}

impl DecryptResponse {
    #[must_use]
    pub fn success(plain_text: String) -> Self {
        Self {
            error_code: ErrorCode::Success,
            error_message: SUCCESS_MESSAGE.to_owned(),
            plain_text,
        }
    }

    #[must_use]
    pub fn failure(error_code: ErrorCode, error_message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_message: error_message.into(),
            plain_text: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DecryptResponse, EncryptResponse, ErrorCode};

    #[test]
    fn responses_serialize_with_the_wire_field_names() {
        let json =
            serde_json::to_value(EncryptResponse::success("Y2lwaGVy".to_owned())).unwrap();
        assert_eq!(json["errorCode"], "0000");
        assert_eq!(json["errorMessage"], "success");
        assert_eq!(json["cipherText"], "Y2lwaGVy");

        let json = serde_json::to_value(DecryptResponse::failure(
            ErrorCode::OperationFailed,
            "key not found: kgk",
        ))
        .unwrap();
        assert_eq!(json["errorCode"], "3333");
        assert_eq!(json["errorMessage"], "key not found: kgk");
        assert_eq!(json["plainText"], "");
    }

    #[test]
    fn error_codes_serialize_as_the_four_digit_strings() {
        for (code, s) in [
            (ErrorCode::Success, "\"0000\""),
            (ErrorCode::MalformedRequest, "\"1111\""),
            (ErrorCode::MalformedPayload, "\"2222\""),
            (ErrorCode::OperationFailed, "\"3333\""),
        ] {
            assert_eq!(serde_json::to_string(&code).unwrap(), s);
        }
    }
}
