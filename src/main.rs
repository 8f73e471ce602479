//! On-device daemon entry point.

mod cli;
mod config;
mod logger;
mod shutdown;
mod status;
mod supervisor;

use std::{net::TcpListener, path::Path, sync::Arc};

use clap::Parser;
use eyre::WrapErr;

use crate::{cli::Cli, config::Config, shutdown::ShutdownHandle, status::Noop};

fn main() {
    color_eyre::install().expect("failed to install error reporter");
    logger::init();

    if let Err(err) = run() {
        log::error!("Fatal error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> eyre::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    let mut shutdown = ShutdownHandle::install(Box::new(Noop)).wrap_err("failed to install signal handlers")?;
    let shutdown_flag = shutdown.flag();

    let cert_path = config.cert.clone().ok_or_else(|| eyre::eyre!("--cert is required"))?;
    let key_path = config.key.clone().ok_or_else(|| eyre::eyre!("--key is required"))?;
    let certs = kvmd_mux::load_certs(&cert_path).wrap_err("loading TLS certificate")?;
    let key = kvmd_mux::load_private_key(&key_path).wrap_err("loading TLS private key")?;
    let tls_config = Arc::new(kvmd_mux::server_config(certs, key).wrap_err("building TLS configuration")?);

    let static_assets_path = config
        .static_assets
        .clone()
        .ok_or_else(|| eyre::eyre!("`static_assets` must be set in the config file"))?;
    let assets = Arc::new(
        kvmd_mux::StaticAssets::load(&static_assets_path).wrap_err("loading static asset archive")?,
    );

    let injector = Arc::new(std::sync::Mutex::new(
        kvmd_hid::Injector::open(
            Path::new(kvmd_hid::DEFAULT_KEYBOARD_DEVICE),
            Path::new(kvmd_hid::DEFAULT_MOUSE_DEVICE),
        )
        .wrap_err("opening HID gadget devices")?,
    ));

    let hub = Arc::new(kvmd_broadcast::Hub::new());

    let listener = TcpListener::bind((config.listen, config.port))
        .wrap_err_with(|| format!("binding {}:{}", config.listen, config.port))?;
    log::info!("listening on {}:{}", config.listen, config.port);

    {
        let hub = Arc::clone(&hub);
        std::thread::Builder::new()
            .name("mux-acceptor".to_string())
            .spawn(move || kvmd_mux::serve(listener, tls_config, assets, hub, injector))
            .wrap_err("spawning the TLS acceptor thread")?;
    }

    let pump_result = supervisor::run(&config, hub, &shutdown_flag);
    shutdown.teardown();
    pump_result.map_err(Into::into)
}
