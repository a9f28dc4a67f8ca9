use std::path::PathBuf;

use crate::{config::ClapConfig, error::ServerError};

/// AES-CBC mechanisms take exactly one cipher block as IV
const CBC_IV_SIZE: usize = 16;
const AES_BLOCK_SIZE: usize = 16;

/// Validated, immutable runtime parameters. Built once from the command
/// line/environment at startup; a rejected configuration is fatal.
#[derive(Debug, Clone)]
pub struct ServerParams {
    pub module_path: PathBuf,
    pub slot_id: usize,
    pub pin: String,
    pub key_label: String,
    pub iv_size: usize,
    pub pad_block_size: usize,
    pub http_host: String,
    pub http_port: u16,
    pub socket: Option<SocketParams>,
}

#[derive(Debug, Clone)]
pub struct SocketParams {
    pub host: String,
    pub port: u16,
}

impl TryFrom<ClapConfig> for ServerParams {
    type Error = ServerError;

    fn try_from(config: ClapConfig) -> Result<Self, Self::Error> {
        if config.hsm.key_label.is_empty() {
            return Err(ServerError::InvalidConfig(
                "the key label must not be empty".to_owned(),
            ));
        }
        if config.hsm.iv_size != CBC_IV_SIZE {
            return Err(ServerError::InvalidConfig(format!(
                "the CBC mechanisms require a {CBC_IV_SIZE}-byte IV, got {}",
                config.hsm.iv_size
            )));
        }
        let pad = config.hsm.pad_block_size;
        if pad == 0 || pad > 255 || !pad.is_multiple_of(AES_BLOCK_SIZE) {
            return Err(ServerError::InvalidConfig(format!(
                "the padding boundary must be a multiple of {AES_BLOCK_SIZE} no larger than 255, \
                 got {pad}"
            )));
        }
        let socket = if config.socket.no_socket {
            None
        } else {
            Some(SocketParams {
                host: config.socket.socket_host,
                port: config.socket.socket_port,
            })
        };
        Ok(Self {
            module_path: config.hsm.module_path,
            slot_id: config.hsm.hsm_slot,
            pin: config.hsm.hsm_pin,
            key_label: config.hsm.key_label,
            iv_size: config.hsm.iv_size,
            pad_block_size: config.hsm.pad_block_size,
            http_host: config.http.http_host,
            http_port: config.http.http_port,
            socket,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::ServerParams;
    use crate::{config::ClapConfig, error::ServerError};

    fn parse(extra: &[&str]) -> ClapConfig {
        let mut args = vec![
            "keybridge",
            "--module-path",
            "/lib/libsofthsm2.so",
            "--hsm-slot",
            "1",
            "--hsm-pin",
            "12345678",
        ];
        args.extend_from_slice(extra);
        ClapConfig::parse_from(args)
    }

    #[test]
    fn defaults_are_applied() {
        let params = ServerParams::try_from(parse(&[])).unwrap();
        assert_eq!(params.key_label, "kgk");
        assert_eq!(params.iv_size, 16);
        assert_eq!(params.pad_block_size, 32);
        assert_eq!(params.http_port, 8888);
        let socket = params.socket.expect("socket enabled by default");
        assert_eq!(socket.port, 9888);
    }

    #[test]
    fn socket_can_be_disabled() {
        let params = ServerParams::try_from(parse(&["--no-socket"])).unwrap();
        assert!(params.socket.is_none());
    }

    #[test]
    fn invalid_sizes_are_rejected() {
        assert!(matches!(
            ServerParams::try_from(parse(&["--iv-size", "0"])),
            Err(ServerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ServerParams::try_from(parse(&["--iv-size", "32"])),
            Err(ServerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ServerParams::try_from(parse(&["--pad-block-size", "33"])),
            Err(ServerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ServerParams::try_from(parse(&["--pad-block-size", "0"])),
            Err(ServerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ServerParams::try_from(parse(&["--key-label", ""])),
            Err(ServerError::InvalidConfig(_))
        ));
    }
}
