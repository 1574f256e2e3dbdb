use std::{process::exit, sync::Arc};

use config::DaemonConfig;
use executor::UpgradeExecutor;
use host::SystemHost;
use housekeeper_core::stamp::StampStore;
use log::{error, info};

mod config;
mod executor;
mod host;
mod server;

#[tokio::main]
async fn main() {
    configure_logger();

    let config = get_config();
    let mut executor = UpgradeExecutor::new(
        Arc::new(SystemHost::new(&config.os_release_path, &config.boot_id_path)),
        StampStore::new(&config.stamp_directory),
        config.command_timeout,
    );
    if let Some(node_name) = &config.node_name {
        executor = executor.with_node_name(node_name);
    }

    let (address, server) = match warp::serve(server::routes(Arc::new(executor)))
        .try_bind_with_graceful_shutdown(config.listen_address, shutdown_signal())
    {
        Ok(bound) => bound,
        Err(err) => {
            error!("Couldn't listen on {}! {err}", config.listen_address);
            exit(8)
        }
    };

    info!(
        "Listening on {address}, stamps in '{}'",
        config.stamp_directory.display()
    );

    server.await;

    info!("Shut down");
}

fn get_config() -> DaemonConfig {
    match DaemonConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Couldn't load configuration! {err}");
            exit(7)
        }
    }
}

async fn shutdown_signal() {
    let mut terminate =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                error!("Couldn't listen for SIGTERM! {err}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate.recv() => {},
    }

    info!("Shutting down...");
}

fn configure_logger() {
    env_logger::builder()
        .default_format()
        .format_module_path(false)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init()
}
