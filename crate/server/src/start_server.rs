use std::{sync::Arc, thread};

use actix_web::{App, HttpServer, web::Data};
use tracing::{error, info};

use crate::{
    config::ServerParams,
    core::CryptoService,
    result::SResult,
    routes, rpc,
    socket_server::{SocketServer, SocketServerConfig},
};

/// Start the HTTP endpoint and, unless disabled, the socket RPC endpoint,
/// both bound to the same gateway core. Runs until the HTTP server stops.
pub async fn start_gateway_server(
    params: &ServerParams,
    service: Arc<dyn CryptoService>,
) -> SResult<()> {
    if let Some(socket) = &params.socket {
        let socket_server = SocketServer::instantiate(&SocketServerConfig {
            host: socket.host.clone(),
            port: socket.port,
        })?;
        let rpc_service = service.clone();
        thread::spawn(move || {
            if let Err(e) = socket_server.start(move |frame| rpc::handle_frame(&rpc_service, frame))
            {
                error!("RPC server terminated: {e}");
            }
        });
    }

    info!(
        "HTTP server listening on {}:{}",
        params.http_host, params.http_port
    );
    let http_service = service;
    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(http_service.clone()))
            .service(routes::encrypt)
            .service(routes::decrypt)
    })
    .bind((params.http_host.clone(), params.http_port))?
    .run()
    .await?;
    Ok(())
}
