use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, GlobalArgs, LogLevel};
use commands::{
    create_update::create_update,
    delete_update::delete_update,
    install::install,
    list_updates::list_updates,
    signal::{signal, unsignal},
    uninstall::uninstall,
};
use env_logger::Target;
use housekeeper_core::kubernetes::operations::create_local_client;
use log::LevelFilter;

mod cli;
mod commands;
mod output;

pub const CLI_FIELD_MANAGER: &str = "housekeeper-cli";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    configure_logging(&cli.global_args);

    let client = create_local_client(&cli.global_args.kube_config, &cli.global_args.kube_context)
        .await
        .context("Couldn't initialize k8s API client!")?;

    let global_args = &cli.global_args;

    match &cli.command {
        Commands::Install(args) => install(global_args, args, &client).await?,
        Commands::Uninstall(args) => uninstall(global_args, args, &client).await?,
        Commands::CreateUpdate(args) => create_update(global_args, args, &client).await?,
        Commands::DeleteUpdate(args) => delete_update(global_args, args, &client).await?,
        Commands::ListUpdates(args) => list_updates(global_args, args, &client).await?,
        Commands::Signal(args) => signal(args, &client).await?,
        Commands::Unsignal(args) => unsignal(args, &client).await?,
    }

    Ok(())
}

fn configure_logging(global_args: &GlobalArgs) {
    let log_level = global_args.get_log_level();
    let mut logger = env_logger::builder();

    logger
        .format_timestamp(None)
        .format_module_path(matches!(log_level, LogLevel::Trace))
        .format_target(false)
        .format_level(false)
        .target(Target::Stderr);

    match log_level {
        LogLevel::Normal => logger.filter(Some("housekeeper"), LevelFilter::Info),
        LogLevel::Verbose => logger.filter(Some("housekeeper"), LevelFilter::Debug),
        LogLevel::Trace => logger.filter(None, LevelFilter::Debug),
    };

    logger.init();
}
