use std::process::exit;

use config::OperatorConfig;
use controller::{reconciler::context::ReconcilerContext, start_update_controller};
use kube::Client;

mod agent_client;
mod config;
mod controller;
mod drain;

#[tokio::main]
async fn main() {
    configure_logger();

    let config = get_config();
    let client = create_client().await;

    start_update_controller(ReconcilerContext::new(client, config).into()).await;
}

async fn create_client() -> Client {
    match Client::try_default().await {
        Ok(client) => client,
        Err(error) => {
            log::error!("Couldn't create client! {error:?}");
            exit(6)
        }
    }
}

fn get_config() -> OperatorConfig {
    match OperatorConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            log::error!("Couldn't load configuration! {error}");
            exit(7)
        }
    }
}

fn configure_logger() {
    env_logger::builder()
        .default_format()
        .format_module_path(false)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init()
}
