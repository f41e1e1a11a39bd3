use anyhow::Context;
use apigw_bridge::{InvocationContext, InvocationEvent, ResponseEnvelope};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apigw-bridge")]
#[command(about = "Drive a local HTTP server with API gateway events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Send one gateway event to the local server and print the response envelope as JSON.
    Invoke {
        /// Config file path (default: APIGW_BRIDGE_CONFIG_PATH or ~/.apigw-bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Target server port (default from APIGW_BRIDGE_PORT or config)
        #[arg(long, short)]
        port: Option<u16>,

        /// Event JSON file. Reads stdin when omitted.
        #[arg(long, short, value_name = "PATH")]
        event: Option<PathBuf>,

        /// Runtime request id, forwarded as x-scf-requestid.
        #[arg(long, value_name = "ID")]
        request_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("apigw-bridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Invoke {
            config,
            port,
            event,
            request_id,
        }) => match run_invoke(config, port, event, request_id).await {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(e) => {
                log::error!("invoke failed: {:#}", e);
                std::process::exit(1);
            }
        },
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Returns Ok(false) when the dispatcher failed and the fallback envelope was printed.
async fn run_invoke(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    event_path: Option<PathBuf>,
    request_id: Option<String>,
) -> anyhow::Result<bool> {
    let (config, _) = apigw_bridge::config::load_config(config_path)?;
    let dispatcher = apigw_bridge::config::build_dispatcher(&config, port)?;

    let raw = read_event(event_path)?;
    let event = InvocationEvent::from_slice(&raw)?;

    let mut ctx = InvocationContext::new();
    if let Some(id) = request_id {
        ctx = ctx.with_request_id(id);
    }

    log::info!("invoking {} {} on port {}", event.method, event.path, dispatcher.port());
    let (envelope, ok) = match dispatcher.handle(&ctx, event).await {
        Ok(envelope) => (envelope, true),
        Err(e) => (e.envelope, false),
    };
    print_envelope(&envelope)?;
    Ok(ok)
}

fn read_event(path: Option<PathBuf>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(p) => std::fs::read(&p).with_context(|| format!("reading event from {}", p.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading event from stdin")?;
            Ok(buf)
        }
    }
}

fn print_envelope(envelope: &ResponseEnvelope) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}
