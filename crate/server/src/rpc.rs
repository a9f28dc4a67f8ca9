//! Socket bindings of the encrypt/decrypt operations.
//!
//! Each frame carries one JSON request naming its operation; the reply is
//! the same response shape the HTTP endpoints produce, with the identical
//! error-code contract.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    core::CryptoService,
    routes::{DecryptResponse, EncryptResponse, ErrorCode},
};

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum RpcOperation {
    Encrypt,
    Decrypt,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub operation: RpcOperation,
    #[serde(default)]
    pub r#type: String,
    /// base64-encoded plaintext (`Encrypt`)
    #[serde(default)]
    pub plain_text: String,
    /// base64-encoded IV-bound ciphertext (`Decrypt`)
    #[serde(default)]
    pub cipher_text: String,
}

/// Reply for frames whose operation cannot be determined.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReply {
    error_code: ErrorCode,
    error_message: String,
}

/// Run one frame through the request state machine and serialize the reply.
pub fn handle_frame(service: &Arc<dyn CryptoService>, frame: &[u8]) -> Vec<u8> {
    let request: RpcRequest = match serde_json::from_slice(frame) {
        Ok(request) => request,
        Err(e) => {
            return to_json(&ErrorReply {
                error_code: ErrorCode::MalformedRequest,
                error_message: e.to_string(),
            });
        }
    };
    debug!(
        "rpc {:?} request for type {}",
        request.operation, request.r#type
    );

    match request.operation {
        RpcOperation::Encrypt => {
            let plaintext = match STANDARD.decode(request.plain_text.as_bytes()) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    return to_json(&EncryptResponse::failure(
                        ErrorCode::MalformedPayload,
                        e.to_string(),
                    ));
                }
            };
            match service.encrypt(&request.r#type, &plaintext) {
                Ok(wrapped) => to_json(&EncryptResponse::success(STANDARD.encode(wrapped))),
                Err(e) => to_json(&EncryptResponse::failure(
                    ErrorCode::OperationFailed,
                    e.to_string(),
                )),
            }
        }
        RpcOperation::Decrypt => {
            let wrapped = match STANDARD.decode(request.cipher_text.as_bytes()) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    return to_json(&DecryptResponse::failure(
                        ErrorCode::MalformedPayload,
                        e.to_string(),
                    ));
                }
            };
            match service.decrypt(&request.r#type, &wrapped) {
                Ok(plaintext) => to_json(&DecryptResponse::success(STANDARD.encode(plaintext.as_slice()))),
                Err(e) => to_json(&DecryptResponse::failure(
                    ErrorCode::OperationFailed,
                    e.to_string(),
                )),
            }
        }
    }
}

// the response types serialize infallibly; an empty frame is the degenerate
// fallback so a reply is always written
fn to_json<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde_json::json;

    use super::handle_frame;
    use crate::{core::CryptoService, test_utils::XorService};

    fn service() -> Arc<dyn CryptoService> {
        Arc::new(XorService::new(16))
    }

    #[test]
    fn undecodable_frame_yields_1111() {
        let reply: serde_json::Value =
            serde_json::from_slice(&handle_frame(&service(), b"garbage")).unwrap();
        assert_eq!(reply["errorCode"], "1111");

        // unknown operations are also a malformed request
        let frame = json!({"operation": "Sign", "type": "KGK"}).to_string();
        let reply: serde_json::Value =
            serde_json::from_slice(&handle_frame(&service(), frame.as_bytes())).unwrap();
        assert_eq!(reply["errorCode"], "1111");
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let service = service();
        let plaintext = "rpc round trip";

        let frame = json!({
            "operation": "Encrypt",
            "type": "KGK",
            "plainText": STANDARD.encode(plaintext),
        })
        .to_string();
        let reply: serde_json::Value =
            serde_json::from_slice(&handle_frame(&service, frame.as_bytes())).unwrap();
        assert_eq!(reply["errorCode"], "0000");

        let frame = json!({
            "operation": "Decrypt",
            "type": "KGK",
            "cipherText": reply["cipherText"],
        })
        .to_string();
        let reply: serde_json::Value =
            serde_json::from_slice(&handle_frame(&service, frame.as_bytes())).unwrap();
        assert_eq!(reply["errorCode"], "0000");
        assert_eq!(
            STANDARD.decode(reply["plainText"].as_str().unwrap()).unwrap(),
            plaintext.as_bytes()
        );
    }

    #[test]
    fn bad_base64_yields_2222() {
        let frame = json!({"operation": "Encrypt", "type": "KGK", "plainText": "%%%"}).to_string();
        let reply: serde_json::Value =
            serde_json::from_slice(&handle_frame(&service(), frame.as_bytes())).unwrap();
        assert_eq!(reply["errorCode"], "2222");
    }
}
