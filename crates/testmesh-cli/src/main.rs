//! `testmesh`: the binary wiring every execution-core component together
//! behind a single command surface, in the shape of the teacher's
//! `mockforge` CLI (clap derive, one subcommand per component, a shared
//! `-v/--log-level` flag).

mod config;
mod wiring;

use clap::{Parser, Subcommand};
use config::CliConfig;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use testmesh_domain::{ContractRepository, ExecutionRepository, Flow, FlowRepository, ScheduleRepository};
use testmesh_foundation::BuiltinSource;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiring::Workspace;

#[derive(Parser)]
#[command(name = "testmesh")]
#[command(about = "TestMesh execution core: flows, mocks, contracts, and schedules")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[arg(short = 'v', long, global = true, default_value = "info")]
    log_level: String,

    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow definition file and print the resulting Execution.
    Run {
        #[arg(short, long)]
        flow: PathBuf,
        /// `key=value` overrides seeded into the execution-scoped variable tier.
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, testmesh_domain::Value)>,
    },
    /// Mock Server Fabric transport.
    Mock {
        #[command(subcommand)]
        command: MockCommands,
    },
    /// Contract Engine operations.
    Contract {
        #[command(subcommand)]
        command: ContractCommands,
    },
    /// Cron Scheduler operations.
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
}

#[derive(Subcommand)]
enum MockCommands {
    /// Serve every registered mock server over HTTP on one listener.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum ContractCommands {
    /// Replay a contract's interactions against a live provider.
    Verify {
        #[arg(long)]
        contract_id: String,
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        state_setup_url: Option<String>,
    },
    /// Classify breaking changes between two contract versions.
    Diff {
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
    },
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Preview a cron expression's upcoming fire times without saving it.
    Validate {
        #[arg(long)]
        cron: String,
        #[arg(long, default_value = "UTC")]
        timezone: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Preview a saved schedule's upcoming fire times.
    Preview {
        #[arg(long)]
        schedule_id: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Run the scheduler loop until interrupted, firing due schedules on tick.
    Tick {
        #[arg(long)]
        period_ms: Option<u64>,
    },
}

fn parse_var(raw: &str) -> Result<(String, testmesh_domain::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), testmesh_domain::Value::from(value)))
}

fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    init_tracing(&cli.log_level, config.log_json);

    let workspace = Workspace::assemble().await?;

    match cli.command {
        Commands::Run { flow, vars } => run_flow(&workspace, &flow, vars).await,
        Commands::Mock { command: MockCommands::Serve { port } } => {
            serve_mocks(&workspace, port.unwrap_or(config.mock_http_port)).await
        }
        Commands::Contract { command } => run_contract_command(&workspace, command).await,
        Commands::Schedule { command } => run_schedule_command(&workspace, command, config.scheduler_tick_period_ms).await,
    }
}

async fn run_schedule_command(
    workspace: &Workspace,
    command: ScheduleCommands,
    default_period_ms: u64,
) -> anyhow::Result<()> {
    match command {
        ScheduleCommands::Validate { cron, timezone, count } => {
            let result = testmesh_scheduler::validate(&cron, &timezone, workspace.builtins.now(), count);
            println!("{}", serde_json::to_string_pretty(&result.into_value().to_json())?);
        }
        ScheduleCommands::Preview { schedule_id, count } => {
            let id: testmesh_domain::ScheduleId = schedule_id.parse()?;
            let schedule = workspace
                .schedules
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown schedule: {schedule_id}"))?;
            let runs = testmesh_scheduler::preview(
                &schedule.cron_expr,
                &schedule.timezone,
                workspace.builtins.now(),
                count,
            )?;
            for run in runs {
                println!("{}", run.to_rfc3339());
            }
        }
        ScheduleCommands::Tick { period_ms } => {
            let scheduler = testmesh_scheduler::Scheduler::new(
                workspace.schedules.clone(),
                workspace.executions.clone(),
                workspace.flows.clone(),
                workspace.runtime.clone(),
                workspace.builtins.clone(),
            );
            let cancel = CancellationToken::new();
            let period = std::time::Duration::from_millis(period_ms.unwrap_or(default_period_ms));
            tracing::info!(?period, "scheduler tick loop starting");
            tokio::select! {
                _ = scheduler.run(period, cancel.clone()) => {}
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                }
            }
        }
    }
    Ok(())
}

async fn run_flow(
    workspace: &Workspace,
    path: &PathBuf,
    vars: Vec<(String, testmesh_domain::Value)>,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path).await?;
    let flow: Flow = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    workspace.flows.put(flow.clone()).await?;

    let overrides: BTreeMap<String, testmesh_domain::Value> = vars.into_iter().collect();
    let execution = workspace
        .runtime
        .execute(&flow, overrides, CancellationToken::new())
        .await?;
    let summary = serde_json::json!({
        "execution_id": execution.id.to_string(),
        "status": format!("{:?}", execution.status),
        "step_count": execution.steps.len(),
    });
    workspace.executions.put(execution).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn serve_mocks(workspace: &Workspace, port: u16) -> anyhow::Result<()> {
    let app = testmesh_mock::router(workspace.mock_fabric.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "mock fabric listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_contract_command(workspace: &Workspace, command: ContractCommands) -> anyhow::Result<()> {
    match command {
        ContractCommands::Verify { contract_id, base_url, state_setup_url } => {
            let id: testmesh_domain::ContractId = contract_id.parse()?;
            let contract = workspace
                .contracts
                .get_contract(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown contract: {contract_id}"))?;
            let verification = testmesh_contracts::Verifier::new()
                .verify(&contract, &base_url, state_setup_url.as_deref(), workspace.builtins.as_ref())
                .await?;
            println!("{:#?}", verification);
        }
        ContractCommands::Diff { old, new } => {
            let old_id: testmesh_domain::ContractId = old.parse()?;
            let new_id: testmesh_domain::ContractId = new.parse()?;
            let old = workspace
                .contracts
                .get_contract(old_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown contract: {old_id}"))?;
            let new = workspace
                .contracts
                .get_contract(new_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown contract: {new_id}"))?;
            let changes = testmesh_contracts::diff(&old, &new);
            let summary = testmesh_contracts::summarize(&changes);
            println!(
                "{} breaking changes (critical={}, major={}, minor={})",
                summary.total, summary.critical, summary.major, summary.minor
            );
            for change in &changes {
                println!(
                    "  {:?} at {}: {} ({})",
                    change.change_type, change.path, change.impact, change.suggestion
                );
            }
        }
    }
    Ok(())
}
