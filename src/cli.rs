//! Command line interface.

use clap::Parser;
use std::{net::IpAddr, path::PathBuf};

/// On-device KVM-over-IP daemon: captures HDMI, encodes H.264 in
/// hardware, and serves the stream to browser clients over TLS.
#[derive(Parser, Debug)]
#[clap(about, version)]
pub struct Cli {
    /// Path to a TOML config file. CLI flags below override its fields.
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// TLS certificate, PEM-encoded.
    #[clap(long)]
    pub cert: Option<PathBuf>,
    /// TLS private key, PEM-encoded.
    #[clap(long)]
    pub key: Option<PathBuf>,
    /// TCP port to listen on.
    #[clap(long)]
    pub port: Option<u16>,
    /// Address to bind the listener to.
    #[clap(long)]
    pub listen: Option<IpAddr>,
    /// V4L2 capture device node.
    #[clap(long)]
    pub device: Option<PathBuf>,
    /// V4L2 M2M encoder device node.
    #[clap(long)]
    pub encoder: Option<PathBuf>,
    /// Target encoder bitrate, in bits per second.
    #[clap(long)]
    pub bitrate: Option<u32>,
    /// GOP size in frames.
    #[clap(long = "gop-size")]
    pub gop_size: Option<u32>,
    /// Number of DMABUFs to allocate for the capture/encoder pipeline.
    #[clap(long = "dmabuf-count")]
    pub dmabuf_count: Option<u32>,
    /// Disable the on-device status display.
    #[clap(long)]
    pub no_epaper: bool,
}
