use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use sustainable_ai::chat::{self, ChatSettings};
use sustainable_ai::footprint::{calculate_footprint, ActivityInputs, DEFAULT_FACTORS};
use sustainable_ai::responder::Responder;
use sustainable_ai::web_server;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the Sustainable.ai web UI.
    Serve {
        #[arg(long, default_value_t = 7860, help = "Port for the web server.")]
        port: u16,
    },
    /// Chat with Sustainable.ai in the terminal.
    Chat {
        #[command(flatten)]
        activity: ActivityArgs,
        #[command(flatten)]
        generation: GenerationArgs,
    },
    /// Print the weekly carbon footprint for the given habits.
    Footprint {
        #[command(flatten)]
        activity: ActivityArgs,
        #[arg(long, help = "Print the result as JSON.")]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct ActivityArgs {
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, help = "Kilometres by car per week.")]
    car_km: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, help = "Kilometres by bus per week.")]
    bus_km: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, help = "Kilometres by train per week.")]
    train_km: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, help = "Kilometres by plane per week.")]
    air_km: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, help = "Meat-based meals per week.")]
    meat_meals: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, help = "Vegetarian meals per week.")]
    vegetarian_meals: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, help = "Vegan meals per week.")]
    vegan_meals: f64,
}

impl From<ActivityArgs> for ActivityInputs {
    fn from(args: ActivityArgs) -> Self {
        ActivityInputs {
            car_km: args.car_km,
            bus_km: args.bus_km,
            train_km: args.train_km,
            air_km: args.air_km,
            meat_meals: args.meat_meals,
            vegetarian_meals: args.vegetarian_meals,
            vegan_meals: args.vegan_meals,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
struct GenerationArgs {
    #[arg(long, help = "Replace the default system message.")]
    system_message: Option<String>,
    #[arg(long, default_value_t = 512, help = "Maximum new tokens (1-2048).")]
    max_tokens: u32,
    #[arg(long, default_value_t = 0.7, help = "Sampling temperature (0.1-4.0).")]
    temperature: f64,
    #[arg(long, default_value_t = 0.95, help = "Top-p nucleus sampling (0.1-1.0).")]
    top_p: f64,
    #[arg(long, help = "Generate with the local Ollama model instead of the hosted router.")]
    local: bool,
    #[arg(long, requires = "local", help = "Disable sampling for the local model (greedy decoding).")]
    no_sample: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for HF_TOKEN and endpoint overrides)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,sustainable_ai=debug).
    // Logs go to stderr so the terminal chat keeps stdout to itself.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("Sustainable.ai starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve { port } => {
            let responder = Responder::from_env().context("Failed to set up the responder")?;
            let server = web_server::start_web_server(port, responder);
            tokio::select! {
                res = server => res.context("Web server stopped")?,
                _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
            }
        }
        Commands::Chat {
            activity,
            generation,
        } => {
            let defaults = ChatSettings::default();
            let settings = ChatSettings {
                system_message: generation.system_message.unwrap_or(defaults.system_message),
                activity: activity.into(),
                max_tokens: generation.max_tokens,
                temperature: generation.temperature,
                top_p: generation.top_p,
                use_local_model: generation.local,
                do_sample: !generation.no_sample,
                hf_token: None,
            };
            let responder = Responder::from_env().context("Failed to set up the responder")?;
            chat::run_terminal_chat(&responder, settings)
                .await
                .context("Chat session failed")?;
        }
        Commands::Footprint { activity, json } => {
            let result = calculate_footprint(&activity.into(), &DEFAULT_FACTORS)
                .context("Could not compute footprint")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Weekly footprint: {:.1} kg CO2", result.total_emissions);
                println!("  ≈ {} trees absorbing it for a year", result.stats.trees);
                println!("  ≈ {} short-haul flights", result.stats.flights);
                println!("  ≈ {} trips of 100 km by car", result.stats.driving100km);
            }
        }
    }

    Ok(())
}
