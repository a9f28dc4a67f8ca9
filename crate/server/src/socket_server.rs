//! TCP socket transport.
//!
//! Frames are a 4-byte big-endian length followed by a JSON body, in both
//! directions. Connections are handled one thread each; frames on a
//! connection are processed in order.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread,
};

use tracing::{debug, error, info, trace};

use crate::{
    error::ServerError,
    result::{SResult, SResultHelper},
};

/// Upper bound on a single request frame
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for the socket server
#[derive(Clone)]
pub struct SocketServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Server handling encrypt/decrypt frames over a TCP socket.
pub struct SocketServer {
    listener: TcpListener,
}

impl SocketServer {
    /// Bind the listener.
    ///
    /// # Errors
    /// - If the server fails to bind to the specified host and port
    pub fn instantiate(config: &SocketServerConfig) -> SResult<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).context(&format!("failed to bind to {addr}"))?;
        Ok(Self { listener })
    }

    /// The address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> SResult<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to read the bound address")
    }

    /// Accept connections until an error occurs or the process terminates.
    /// The `request_handler` is called for each incoming frame and its
    /// return value is written back as the response frame. Each client
    /// connection runs in its own thread.
    ///
    /// # Errors
    /// - If accepting on the listener fails irrecoverably
    pub fn start<F>(&self, request_handler: F) -> SResult<()>
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        info!("RPC server listening on {}", self.local_addr()?);
        let handler = Arc::new(request_handler);

        for stream in self.listener.incoming() {
            match stream {
                Ok(mut stream) => {
                    let handler = handler.clone();
                    thread::spawn(move || {
                        if let Err(e) = handle_client(&mut stream, &handler) {
                            error!("error handling client: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("connection failed: {e}");
                }
            }
        }

        Ok(())
    }
}

fn handle_client(
    stream: &mut TcpStream,
    handler: &Arc<impl Fn(&[u8]) -> Vec<u8> + Send + Sync>,
) -> SResult<()> {
    let peer_addr = stream
        .peer_addr()
        .map_or("[N/A]".to_owned(), |sa| sa.to_string());
    debug!("client connected from {peer_addr}");

    loop {
        let mut header = [0_u8; 4];
        match stream.read_exact(&mut header) {
            Ok(()) => {
                let length = usize::try_from(u32::from_be_bytes(header))
                    .context("failed to parse the request length")?;
                if length > MAX_FRAME_SIZE {
                    return Err(ServerError::InvalidRequest(format!(
                        "frame of {length} bytes exceeds the {MAX_FRAME_SIZE}-byte limit"
                    )));
                }

                let mut request = vec![0_u8; length];
                stream
                    .read_exact(&mut request)
                    .context("failed to read the request body")?;
                trace!("received frame: {}", hex::encode(&request));

                let response = handler(&request);

                let header = u32::try_from(response.len())
                    .context("response too large for the frame header")?
                    .to_be_bytes();
                stream
                    .write_all(&header)
                    .context("failed to send the response header")?;
                stream
                    .write_all(&response)
                    .context("failed to send the response body")?;
                stream.flush().context("failed to flush the stream")?;

                trace!("response sent to {peer_addr}");
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("client {peer_addr} disconnected");
                break;
            }
            Err(e) => {
                return Err(e).context("failed to read the request header");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpStream,
        sync::Arc,
        thread,
    };

    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde_json::json;

    use super::{SocketServer, SocketServerConfig};
    use crate::{core::CryptoService, rpc, test_utils::XorService};

    fn roundtrip_frame(stream: &mut TcpStream, frame: &[u8]) -> serde_json::Value {
        let header = u32::try_from(frame.len()).unwrap().to_be_bytes();
        stream.write_all(&header).unwrap();
        stream.write_all(frame).unwrap();

        let mut header = [0_u8; 4];
        stream.read_exact(&mut header).unwrap();
        let mut response = vec![0_u8; usize::try_from(u32::from_be_bytes(header)).unwrap()];
        stream.read_exact(&mut response).unwrap();
        serde_json::from_slice(&response).unwrap()
    }

    #[test]
    fn frames_round_trip_over_a_live_connection() {
        let server = SocketServer::instantiate(&SocketServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 0,
        })
        .unwrap();
        let addr = server.local_addr().unwrap();

        let service: Arc<dyn CryptoService> = Arc::new(XorService::new(16));
        thread::spawn(move || {
            let _ = server.start(move |frame| rpc::handle_frame(&service, frame));
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        let plaintext = "framed payload";

        let reply = roundtrip_frame(
            &mut stream,
            json!({
                "operation": "Encrypt",
                "type": "KGK",
                "plainText": STANDARD.encode(plaintext),
            })
            .to_string()
            .as_bytes(),
        );
        assert_eq!(reply["errorCode"], "0000");

        // a second frame on the same connection
        let reply = roundtrip_frame(
            &mut stream,
            json!({
                "operation": "Decrypt",
                "type": "KGK",
                "cipherText": reply["cipherText"],
            })
            .to_string()
            .as_bytes(),
        );
        assert_eq!(reply["errorCode"], "0000");
        assert_eq!(
            STANDARD.decode(reply["plainText"].as_str().unwrap()).unwrap(),
            plaintext.as_bytes()
        );

        // an undecodable frame still gets a structured reply
        let reply = roundtrip_frame(&mut stream, b"garbage");
        assert_eq!(reply["errorCode"], "1111");
    }
}
