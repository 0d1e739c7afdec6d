use std::{path::PathBuf, process, sync::Arc};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use flowchart_view::{
    VERSION,
    config::{FlowchartConfig, RunArgs},
    plugin::FlowchartPlugin,
    render::{Assets, Renderer},
    schema::write_schema,
};
use parley_plugin::{
    HostClient, RpcHostClient, config::load_dotenv, logger::init_tracing, plugin_runtime::shutdown_signal,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "flowchart_view",
    about = "Flowchart View plugin for Parley",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the plugin (the default when launched by the host)
    Run(RunArgs),

    /// Emit JSON-Schema for the host-facing types
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(default_value = "schemas")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv(None);
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run(cli.run)) {
        Commands::Run(args) => {
            let code = run(args).await?;
            process::exit(code);
        }
        Commands::Schema(args) => {
            write_schema(&args.out_dir)?;
            println!("Schemas written to {}", args.out_dir.display());
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let cfg = FlowchartConfig::from_args(args)?;
    let _guard = init_tracing(&cfg.log_level, cfg.log_dir.as_deref(), "flowchart_view.log")?;
    info!(version = VERSION, "flowchart view starting");

    let assets = Assets::load(cfg.assets_dir.as_deref())?;
    let renderer = Arc::new(Renderer::new(assets)?);

    let addr = cfg.connection.address();
    let (client, events) = RpcHostClient::connect(&cfg.connection)
        .await
        .with_context(|| format!("could not connect to host at {addr}"))?;
    info!(%addr, "connected to host");
    let host: Arc<dyn HostClient> = Arc::new(client);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("interrupted");
        interrupt.cancel();
    });

    let code = FlowchartPlugin::new(host, renderer, cfg.sync).run_to_completion(events, cancel).await;
    info!(code, "flowchart view exited");
    Ok(code)
}
