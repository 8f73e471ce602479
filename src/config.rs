//! Daemon configuration: an optional TOML file, overlaid with CLI flags.

use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
};

use crate::cli::Cli;

/// Effective configuration for one run of the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind the TLS listener to.
    pub listen: IpAddr,
    /// TCP port to listen on.
    pub port: u16,
    /// TLS certificate, PEM-encoded. Required; no default.
    pub cert: Option<PathBuf>,
    /// TLS private key, PEM-encoded. Required; no default.
    pub key: Option<PathBuf>,
    /// V4L2 capture device node.
    pub device: PathBuf,
    /// V4L2 M2M encoder device node.
    pub encoder: PathBuf,
    /// Target encoder bitrate, in bits per second.
    pub bitrate: u32,
    /// GOP size in frames.
    pub gop_size: u32,
    /// Number of DMABUFs to allocate for the capture/encoder pipeline.
    pub dmabuf_count: u32,
    /// Path to the tar archive of static assets served over HTTP.
    pub static_assets: Option<PathBuf>,
    /// Whether the on-device status display is disabled.
    pub no_epaper: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8443,
            cert: None,
            key: None,
            device: PathBuf::from("/dev/video0"),
            encoder: PathBuf::from("/dev/video11"),
            bitrate: 1_000_000,
            gop_size: 3,
            dmabuf_count: 6,
            static_assets: None,
            no_epaper: false,
        }
    }
}

impl Config {
    /// Loads the config file named by `cli.config`, if any, then
    /// overlays every CLI flag the user actually passed.
    pub fn load(cli: &Cli) -> eyre::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            None => Self::default(),
        };
        config.overlay(cli);
        Ok(config)
    }

    fn overlay(&mut self, cli: &Cli) {
        if let Some(cert) = &cli.cert {
            self.cert = Some(cert.clone());
        }
        if let Some(key) = &cli.key {
            self.key = Some(key.clone());
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(listen) = cli.listen {
            self.listen = listen;
        }
        if let Some(device) = &cli.device {
            self.device = device.clone();
        }
        if let Some(encoder) = &cli.encoder {
            self.encoder = encoder.clone();
        }
        if let Some(bitrate) = cli.bitrate {
            self.bitrate = bitrate;
        }
        if let Some(gop_size) = cli.gop_size {
            self.gop_size = gop_size;
        }
        if let Some(dmabuf_count) = cli.dmabuf_count {
            self.dmabuf_count = dmabuf_count;
        }
        if cli.no_epaper {
            self.no_epaper = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from(["kvmd", "--port", "9000", "--bitrate", "2000000"]);
        let mut config = Config::default();
        config.overlay(&cli);
        assert_eq!(config.port, 9000);
        assert_eq!(config.bitrate, 2_000_000);
        assert_eq!(config.device, PathBuf::from("/dev/video0"));
    }
}
