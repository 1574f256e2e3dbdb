use clap::{Args, Parser, Subcommand, ValueEnum};
use housekeeper_core::resources::release::{DEFAULT_DAEMON_IMAGE, DEFAULT_OPERATOR_IMAGE};

pub const DEFAULT_NAMESPACE: &str = "housekeeper-system";

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[command(flatten)]
    pub global_args: GlobalArgs,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// kubernetes namespace to work with
    #[arg(short = 'n', long, global = true, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
    /// override default kubeconfig
    #[arg(long, global = true)]
    pub kube_config: Option<String>,
    /// override default kubeconfig context
    #[arg(long, global = true)]
    pub kube_context: Option<String>,
    /// enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose_logging: bool,
    /// enable trace output (more detailed than verbose, overrides it if present)
    #[arg(long = "trace", global = true)]
    pub trace_logging: bool,
}

impl GlobalArgs {
    pub fn get_log_level(&self) -> LogLevel {
        if self.trace_logging {
            return LogLevel::Trace;
        }

        if self.verbose_logging {
            return LogLevel::Verbose;
        }

        LogLevel::Normal
    }
}

pub enum LogLevel {
    Normal,
    Verbose,
    Trace,
}

#[derive(Debug, Subcommand)]
#[command(arg_required_else_help = true)]
pub enum Commands {
    /// install housekeeper on the cluster
    #[command(alias = "i")]
    Install(InstallArgs),
    /// uninstall housekeeper from the cluster
    Uninstall(UninstallArgs),
    /// create or replace an upgrade request
    #[command(alias = "cu")]
    CreateUpdate(CreateUpdateArgs),
    /// delete an upgrade request
    #[command(alias = "du")]
    DeleteUpdate(DeleteUpdateArgs),
    /// list upgrade requests
    #[command(alias = "lu")]
    ListUpdates(ListUpdatesArgs),
    /// allow a node to be drained and upgraded
    Signal(SignalArgs),
    /// withdraw the upgrade signal from a node
    Unsignal(SignalArgs),
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// if set, no action will be taken on the cluster
    #[arg(long)]
    pub dry_run: bool,
    /// push the installation even if it already exists in the cluster
    #[arg(long)]
    pub force: bool,
    /// substitutes the housekeeper-daemon container image if specified
    #[arg(long, default_value = DEFAULT_DAEMON_IMAGE)]
    pub daemon_image: String,
    /// substitutes the housekeeper-operator container image if specified
    #[arg(long, default_value = DEFAULT_OPERATOR_IMAGE)]
    pub operator_image: String,
}

#[derive(Debug, Args)]
pub struct UninstallArgs {
    /// try to remove the namespace afterwards
    #[arg(long)]
    pub delete_namespace: bool,
    /// if set, no action will be taken on the cluster
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct CreateUpdateArgs {
    /// name of the update
    pub name: String,
    /// target OS version, requires --os-image-url
    #[arg(long)]
    pub os_version: Option<String>,
    /// OS image the nodes are rebased onto
    #[arg(long)]
    pub os_image_url: Option<String>,
    /// target kubernetes version
    #[arg(long)]
    pub kube_version: Option<String>,
    /// evict pods that aren't managed by a controller when draining
    #[arg(long)]
    pub evict_pod_force: bool,
    /// restrict the update to a single node
    #[arg(long = "node")]
    pub node_name: Option<String>,
    /// if set, no action will be taken on the cluster
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct DeleteUpdateArgs {
    /// name of the update
    pub name: String,
    /// if set, no action will be taken on the cluster
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct ListUpdatesArgs {
    /// output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::TableWithHeaders)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct SignalArgs {
    /// name of the node
    pub node: String,
    /// if set, no action will be taken on the cluster
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// names only
    #[value(name = "names")]
    Names,
    /// table without headers
    #[value(name = "table-no-headers")]
    Table,
    #[value(name = "table")]
    TableWithHeaders,
    #[value(name = "json")]
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
    #[value(name = "yaml")]
    Yaml,
}
