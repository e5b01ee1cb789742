use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use efficiency_ai::chat;
use efficiency_ai::clipboard::SystemClipboard;
use efficiency_ai::constants;
use efficiency_ai::web_server;
use efficiency_ai::{ActionController, OpenAiPlanner, PlannerConfig};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    planner: PlannerArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the completion service; defaults come from the environment.
#[derive(clap::Args, Debug)]
struct PlannerArgs {
    #[arg(long, global = true, help = "Chat-completions endpoint to call.")]
    api_url: Option<String>,
    #[arg(long, global = true, help = "Model identifier sent with each request.")]
    model: Option<String>,
    #[arg(long, global = true, help = "Seconds to wait for the service before giving up.")]
    timeout_secs: Option<u64>,
}

impl PlannerArgs {
    fn into_config(self) -> PlannerConfig {
        let mut config = PlannerConfig::default();
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the planning form on a local web server.
    Serve {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
    },
    /// Generate a single plan and print it.
    Plan {
        #[arg(long, help = "The objective to plan for.")]
        goal: String,
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, help = "OpenAI API key.")]
        api_key: String,
        #[arg(long, help = "Also copy the plan to the clipboard.")]
        copy: bool,
    },
    /// Plan goals interactively in the terminal.
    Chat {
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, help = "OpenAI API key.")]
        api_key: String,
    },
}

fn build_controller(config: PlannerConfig) -> Arc<ActionController> {
    let planner = OpenAiPlanner::new(config);
    let config = planner.config();
    info!(api_url = %config.api_url, model = %config.model, timeout = ?config.timeout, "Using completion service");
    Arc::new(ActionController::new(Arc::new(planner), Arc::new(SystemClipboard)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,efficiency_ai=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let controller = build_controller(cli.planner.into_config());

    match cli.command {
        Commands::Serve { port } => {
            info!("Starting Efficiency AI on port {}...", port);

            let server_controller = controller.clone();
            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, server_controller).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                    controller.cancel();
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Plan { goal, api_key, copy } => {
            controller.update_goal(goal);
            controller.update_credential(api_key);

            let plan = controller.generate().await?;
            println!("{}", plan);

            if copy && controller.copy_result() {
                eprintln!("Plan copied to clipboard.");
            }
        }
        Commands::Chat { api_key } => {
            controller.update_credential(api_key);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            chat::run_planning_chat(&controller, stdin, tokio::io::stdout())
                .await
                .context("Chat session failed")?;
        }
    }

    Ok(())
}
