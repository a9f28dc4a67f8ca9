//! HTTP bindings of the encrypt/decrypt operations.
//!
//! The body is read raw and decoded by hand so that a malformed request
//! deterministically maps to the `1111` reply. Every call produces exactly
//! one structured response with HTTP status 200; the error contract lives in
//! `errorCode`, not in the status line.

mod models;

use std::sync::Arc;

use actix_web::{
    HttpResponse, post,
    web::{self, Bytes, Data},
};
use base64::{Engine, engine::general_purpose::STANDARD};
pub use models::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, ErrorCode, SUCCESS_MESSAGE,
};
use tracing::{debug, info};

use crate::core::CryptoService;

#[post("/api/v1/encrypt")]
pub async fn encrypt(body: Bytes, service: Data<Arc<dyn CryptoService>>) -> HttpResponse {
    info!("POST /api/v1/encrypt");
    let request: EncryptRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return HttpResponse::Ok()
                .json(EncryptResponse::failure(ErrorCode::MalformedRequest, e.to_string()));
        }
    };
    debug!("encrypt request for type {}", request.r#type);

    let plaintext = match STANDARD.decode(request.plain_text.as_bytes()) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            return HttpResponse::Ok()
                .json(EncryptResponse::failure(ErrorCode::MalformedPayload, e.to_string()));
        }
    };

    let service = service.get_ref().clone();
    let key_type = request.r#type;
    match web::block(move || service.encrypt(&key_type, &plaintext)).await {
        Ok(Ok(wrapped)) => HttpResponse::Ok().json(EncryptResponse::success(STANDARD.encode(wrapped))),
        Ok(Err(e)) => HttpResponse::Ok()
            .json(EncryptResponse::failure(ErrorCode::OperationFailed, e.to_string())),
        Err(e) => HttpResponse::Ok()
            .json(EncryptResponse::failure(ErrorCode::OperationFailed, e.to_string())),
    }
}

#[post("/api/v1/decrypt")]
pub async fn decrypt(body: Bytes, service: Data<Arc<dyn CryptoService>>) -> HttpResponse {
    info!("POST /api/v1/decrypt");
    let request: DecryptRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return HttpResponse::Ok()
                .json(DecryptResponse::failure(ErrorCode::MalformedRequest, e.to_string()));
        }
    };
    debug!("decrypt request for type {}", request.r#type);

    let wrapped = match STANDARD.decode(request.cipher_text.as_bytes()) {
        Ok(wrapped) => wrapped,
        Err(e) => {
            return HttpResponse::Ok()
                .json(DecryptResponse::failure(ErrorCode::MalformedPayload, e.to_string()));
        }
    };

    let service = service.get_ref().clone();
    let key_type = request.r#type;
    match web::block(move || service.decrypt(&key_type, &wrapped)).await {
        Ok(Ok(plaintext)) => {
            HttpResponse::Ok().json(DecryptResponse::success(STANDARD.encode(plaintext.as_slice())))
        }
        Ok(Err(e)) => HttpResponse::Ok()
            .json(DecryptResponse::failure(ErrorCode::OperationFailed, e.to_string())),
        Err(e) => HttpResponse::Ok()
            .json(DecryptResponse::failure(ErrorCode::OperationFailed, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, test, web::Data};
    use base64::{Engine, engine::general_purpose::STANDARD};
    use futures::future::join_all;
    use serde_json::json;

    use super::{DecryptResponse, EncryptResponse, ErrorCode, decrypt, encrypt};
    use crate::{
        core::CryptoService,
        test_utils::{FailingService, XorService},
    };

    const IV_SIZE: usize = 16;

    macro_rules! post {
        ($app:expr, $uri:expr, $body:expr) => {{
            let request = test::TestRequest::post()
                .uri($uri)
                .set_payload($body)
                .to_request();
            let value: serde_json::Value = test::call_and_read_body_json($app, request).await;
            value
        }};
    }

    macro_rules! test_app {
        ($service:expr) => {{
            let service: Arc<dyn CryptoService> = Arc::new($service);
            test::init_service(
                App::new()
                    .app_data(Data::new(service))
                    .service(encrypt)
                    .service(decrypt),
            )
            .await
        }};
    }

    fn body(value: serde_json::Value) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    #[actix_web::test]
    async fn malformed_json_yields_1111() {
        let app = test_app!(XorService::new(IV_SIZE));
        for uri in ["/api/v1/encrypt", "/api/v1/decrypt"] {
            let reply = post!(&app, uri, b"{not json".to_vec());
            assert_eq!(reply["errorCode"], "1111");
        }
    }

    #[actix_web::test]
    async fn malformed_base64_yields_2222() {
        let app = test_app!(XorService::new(IV_SIZE));
        let reply = post!(
            &app,
            "/api/v1/encrypt",
            body(json!({"type": "KGK", "plainText": "!!not-base64!!"}))
        );
        assert_eq!(reply["errorCode"], "2222");

        let reply = post!(
            &app,
            "/api/v1/decrypt",
            body(json!({"type": "KGK", "cipherText": "%%%"}))
        );
        assert_eq!(reply["errorCode"], "2222");
    }

    #[actix_web::test]
    async fn service_failure_yields_3333() {
        let app = test_app!(FailingService);
        let reply = post!(
            &app,
            "/api/v1/encrypt",
            body(json!({"type": "KGK", "plainText": STANDARD.encode("data")}))
        );
        assert_eq!(reply["errorCode"], "3333");
        assert!(
            reply["errorMessage"]
                .as_str()
                .unwrap()
                .contains("key not found")
        );
    }

    #[actix_web::test]
    async fn short_envelope_yields_3333() {
        let app = test_app!(XorService::new(IV_SIZE));
        // a ciphertext shorter than the configured IV size cannot be unwrapped
        let reply = post!(
            &app,
            "/api/v1/decrypt",
            body(json!({"type": "KGK", "cipherText": STANDARD.encode([0_u8; IV_SIZE - 1])}))
        );
        assert_eq!(reply["errorCode"], "3333");
    }

    #[actix_web::test]
    async fn encrypt_then_decrypt_round_trips() {
        let app = test_app!(XorService::new(IV_SIZE));
        let plaintext = "kbtg-tma team building";

        let reply: EncryptResponse = serde_json::from_value(post!(
            &app,
            "/api/v1/encrypt",
            body(json!({"type": "KGK", "plainText": STANDARD.encode(plaintext)}))
        ))
        .unwrap();
        assert_eq!(reply.error_code, ErrorCode::Success);
        assert_eq!(reply.error_message, "success");
        // the envelope carries the IV in front of the ciphertext
        let wrapped = STANDARD.decode(&reply.cipher_text).unwrap();
        assert_eq!(wrapped.len(), IV_SIZE + plaintext.len());

        let reply: DecryptResponse = serde_json::from_value(post!(
            &app,
            "/api/v1/decrypt",
            body(json!({"type": "KGK", "cipherText": reply.cipher_text}))
        ))
        .unwrap();
        assert_eq!(reply.error_code, ErrorCode::Success);
        assert_eq!(STANDARD.decode(&reply.plain_text).unwrap(), plaintext.as_bytes());
    }

    #[actix_web::test]
    async fn concurrent_requests_round_trip_their_own_data() {
        let app = test_app!(XorService::new(IV_SIZE));

        let encrypts = (0..16_u8).map(|i| {
            let app = &app;
            async move {
                let plaintext = format!("request payload {i}");
                let reply: EncryptResponse = serde_json::from_value(post!(
                    app,
                    "/api/v1/encrypt",
                    body(json!({"type": "KGK", "plainText": STANDARD.encode(&plaintext)}))
                ))
                .unwrap();
                assert_eq!(reply.error_code, ErrorCode::Success);
                (plaintext, reply.cipher_text)
            }
        });
        let envelopes = join_all(encrypts).await;

        let decrypts = envelopes.iter().map(|(plaintext, cipher_text)| {
            let app = &app;
            async move {
                let reply: DecryptResponse = serde_json::from_value(post!(
                    app,
                    "/api/v1/decrypt",
                    body(json!({"type": "KGK", "cipherText": cipher_text}))
                ))
                .unwrap();
                assert_eq!(reply.error_code, ErrorCode::Success);
                assert_eq!(STANDARD.decode(&reply.plain_text).unwrap(), plaintext.as_bytes());
            }
        });
        join_all(decrypts).await;
    }
}
