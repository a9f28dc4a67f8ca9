use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "keybridge",
    version,
    about = "HSM-backed symmetric encryption gateway"
)]
pub struct ClapConfig {
    #[clap(flatten)]
    pub hsm: HsmConfig,

    #[clap(flatten)]
    pub http: HttpConfig,

    #[clap(flatten)]
    pub socket: SocketConfig,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Run the gateway (the default when no command is given)
    Serve,
    /// Generate a 256-bit AES token key under the given label
    CreateKey { label: String },
    /// Resolve a key label to its object handle
    FindKey { label: String },
    /// Find and destroy the key under the given label. Irreversible
    DestroyKey { label: String },
    /// Round-trip the configured key through every supported mechanism
    SelfTest,
}

#[derive(Args, Clone, Debug)]
pub struct HsmConfig {
    /// Path to the PKCS#11 library of the HSM provider
    #[clap(long, env = "KEYBRIDGE_MODULE_PATH")]
    pub module_path: PathBuf,

    /// HSM slot holding the gateway key store
    #[clap(long, env = "KEYBRIDGE_HSM_SLOT")]
    pub hsm_slot: usize,

    /// User PIN for the slot
    #[clap(long, env = "KEYBRIDGE_HSM_PIN", hide_env_values = true)]
    pub hsm_pin: String,

    /// Label of the AES key serving the encrypt/decrypt endpoints
    #[clap(long, env = "KEYBRIDGE_KEY_LABEL", default_value = "kgk")]
    pub key_label: String,

    /// Length in bytes of the IV prepended to every ciphertext
    #[clap(long, default_value = "16")]
    pub iv_size: usize,

    /// PKCS#7 boundary used when padding for the raw block modes
    #[clap(long, default_value = "32")]
    pub pad_block_size: usize,
}

#[derive(Args, Clone, Debug)]
pub struct HttpConfig {
    /// Address the HTTP endpoint binds to
    #[clap(long, default_value = "0.0.0.0")]
    pub http_host: String,

    /// Port of the HTTP endpoint
    #[clap(long, default_value = "8888")]
    pub http_port: u16,
}

#[derive(Args, Clone, Debug)]
pub struct SocketConfig {
    /// Address the socket RPC endpoint binds to
    #[clap(long, default_value = "0.0.0.0")]
    pub socket_host: String,

    /// Port of the socket RPC endpoint
    #[clap(long, default_value = "9888")]
    pub socket_port: u16,

    /// Do not start the socket RPC endpoint
    #[clap(long)]
    pub no_socket: bool,
}
