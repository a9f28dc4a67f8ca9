use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use keybridge_hsm::{AesKeySize, Hsm, KeyClass};
use keybridge_server::{
    config::{ClapConfig, Command, ServerParams},
    core::{CryptoService, Gateway},
    result::SResult,
    start_server::start_gateway_server,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Parse the configuration, open the hardware session and either serve
/// traffic or run a provisioning command.
///
/// Startup failures are fatal: the gateway never serves traffic without a
/// live, authenticated session.
#[actix_web::main]
async fn main() -> SResult<()> {
    // Load variables from a .env file
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let clap_config = ClapConfig::parse();
    let command = clap_config.command.clone().unwrap_or(Command::Serve);
    let params = ServerParams::try_from(clap_config)?;

    let hsm = Hsm::instantiate(&params.module_path)?;
    info!(
        "loaded PKCS#11 module {}: {}",
        params.module_path.display(),
        hsm.get_info()?
    );
    let session = hsm.open_slot(params.slot_id, Some(params.pin.clone()))?;
    info!("logged in to slot {}", params.slot_id);

    match command {
        Command::Serve => {
            let gateway = Gateway::new(session, params.key_label.clone(), params.iv_size);
            let service: Arc<dyn CryptoService> = Arc::new(gateway);
            Box::pin(start_gateway_server(&params, service)).await
        }
        Command::CreateKey { label } => {
            let handle = session.generate_aes_key(&label, AesKeySize::Aes256, true)?;
            println!("created AES-256 key {label} (handle {handle})");
            Ok(session.close()?)
        }
        Command::FindKey { label } => {
            let handle = session.find_key(KeyClass::Secret, &label)?;
            println!("key {label} resolves to handle {handle}");
            Ok(session.close()?)
        }
        Command::DestroyKey { label } => {
            let handle = session.find_key(KeyClass::Secret, &label)?;
            session.destroy_object(handle)?;
            session.forget_handle(KeyClass::Secret, &label)?;
            println!("destroyed key {label}");
            Ok(session.close()?)
        }
        Command::SelfTest => {
            let gateway = Gateway::new(session, params.key_label.clone(), params.iv_size);
            gateway.self_test(params.pad_block_size)?;
            println!("self test passed");
            Ok(())
        }
    }
}
