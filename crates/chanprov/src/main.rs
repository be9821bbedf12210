use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chanprov::{
    prepare_channel, ConfigOverrides, FileSystemWallets, HttpNetwork, OrgSelection,
    PrepareRequest, ProvisionConfig, ProvisionMode, WorkflowContext,
};
use chanprov_core::{loaded_admin_label, ChannelName, Organization, Role, Topology};

#[derive(Parser)]
#[command(name = "chanprov", version, about = "Provision identities and bootstrap channels on a permissioned ledger network", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect admin signatures, create the channel and join every peer.
    Prepare(PrepareCommand),
    /// Register and enroll an identity with an organization's CA.
    Enroll(EnrollCommand),
    /// Import an identity from offline-generated crypto material.
    Load(LoadCommand),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Topology descriptor (JSON).
    #[arg(long)]
    topology: PathBuf,
    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding the per-organization wallets.
    #[arg(long)]
    wallet_root: Option<PathBuf>,
    /// Root of the offline-generated crypto material.
    #[arg(long)]
    material_dir: Option<PathBuf>,
    /// Per-request timeout in milliseconds for CA, orderer and peer calls.
    #[arg(long)]
    request_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct PrepareCommand {
    /// Channel to create and join.
    channel: String,
    /// How organization admins are obtained: load or enroll.
    #[arg(long, default_value_t = ProvisionMode::Enroll)]
    mode: ProvisionMode,
    /// Sign and join for this organization only.
    #[arg(long)]
    org: Option<String>,
    /// Organization that takes no part in the channel. May be repeated.
    #[arg(long = "exclude-org", action = ArgAction::Append)]
    exclude_orgs: Vec<String>,
    /// Directory holding `<channel>.tx`.
    #[arg(long)]
    envelope_dir: Option<PathBuf>,
    /// Distinct organization signatures required before submission.
    #[arg(long)]
    quorum: Option<usize>,
    /// Pause after channel creation before peers join.
    #[arg(long)]
    settle_delay_ms: Option<u64>,
    /// Peers joined in parallel.
    #[arg(long)]
    join_concurrency: Option<usize>,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct EnrollCommand {
    #[arg(long)]
    org: String,
    /// Wallet label; also the enrollment id at the CA.
    #[arg(long)]
    user: String,
    /// Register with the admin role regardless of the label.
    #[arg(long)]
    admin: bool,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct LoadCommand {
    #[arg(long)]
    org: String,
    /// User name in the crypto material, e.g. `Admin` or `User1`. `Admin`
    /// is stored under the label load mode signs with.
    #[arg(long)]
    user: String,
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    tokio::select! {
        result = run(cli.command) => result,
        _ = shutdown.cancelled() => bail!("interrupted"),
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Prepare(cmd) => prepare(cmd).await,
        Commands::Enroll(cmd) => enroll(cmd).await,
        Commands::Load(cmd) => load(cmd).await,
    }
}

async fn prepare(cmd: PrepareCommand) -> Result<()> {
    let channel = ChannelName::new(cmd.channel).context("invalid channel name")?;
    let overrides = ConfigOverrides {
        envelope_dir: cmd.envelope_dir,
        quorum: cmd.quorum,
        settle_delay_ms: cmd.settle_delay_ms,
        join_concurrency: cmd.join_concurrency,
        exclude_orgs: (!cmd.exclude_orgs.is_empty()).then_some(cmd.exclude_orgs),
        ..ConfigOverrides::default()
    };
    let ctx = context(cmd.common, overrides).await?;
    let request = PrepareRequest {
        channel,
        selection: cmd.org.map_or(OrgSelection::All, OrgSelection::Single),
        mode: cmd.mode,
    };

    let report = prepare_channel(&ctx, &request).await?;
    info!(
        channel = %report.channel,
        status = ?report.status,
        signatures = report.signatures,
        joined = report.joined.len(),
        "done"
    );
    Ok(())
}

async fn enroll(cmd: EnrollCommand) -> Result<()> {
    let ctx = context(cmd.common, ConfigOverrides::default()).await?;
    let org = organization(&ctx, &cmd.org)?;
    let provisioner = ctx.provisioner(org)?;
    provisioner.ensure_registrar().await?;
    let role = if cmd.admin {
        Role::Admin
    } else {
        Role::for_label(&cmd.user)
    };
    let identity = provisioner.ensure_enrolled(&cmd.user, role).await?;
    info!(org = %org.name, label = %identity.label, role = %identity.role, "identity ready");
    Ok(())
}

async fn load(cmd: LoadCommand) -> Result<()> {
    let ctx = context(cmd.common, ConfigOverrides::default()).await?;
    let org = organization(&ctx, &cmd.org)?;
    let (label, role) = if cmd.user.eq_ignore_ascii_case("admin") {
        (loaded_admin_label(&org.name), Role::Admin)
    } else {
        (cmd.user.clone(), Role::Client)
    };
    let identity = ctx
        .provisioner(org)?
        .load_identity(&cmd.user, &label, role)
        .await?;
    info!(org = %org.name, label = %identity.label, "identity imported");
    Ok(())
}

async fn context(common: CommonArgs, mut overrides: ConfigOverrides) -> Result<WorkflowContext> {
    overrides.wallet_root = common.wallet_root;
    overrides.material_dir = common.material_dir;
    overrides.request_timeout_ms = common.request_timeout_ms;
    let config = ProvisionConfig::from_sources(common.topology, common.config, overrides).await?;
    let topology = Topology::from_path(&config.topology_path).with_context(|| {
        format!("loading topology from {}", config.topology_path.display())
    })?;

    let wallets = Arc::new(FileSystemWallets::new(config.wallet.root.clone()));
    let network = Arc::new(HttpNetwork::new(config.transport));
    Ok(WorkflowContext::new(topology, config, wallets, network))
}

fn organization<'a>(ctx: &'a WorkflowContext, name: &str) -> Result<&'a Organization> {
    match ctx.topology.organization(name) {
        Some(org) => Ok(org),
        None => bail!("organization {name} is not part of the topology"),
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    let _ = subscriber.try_init();
}
