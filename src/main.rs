use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use labscribe::config::{resolve_api_key, Config};
use labscribe::generate::{
    handle_generate, GeminiClient, GenerateMode, GenerateRequest, GenerateResponse, PlanGenerator,
};
use labscribe::server;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "labscribe=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(
    name = "labscribe",
    about = "Generate lab practical notebook plans with a hosted language model",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Generate one plan and print the response envelope
    Generate(GenerateArgs),
    /// Write the default config file
    InitConfig,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on (overrides config and LABSCRIBE_BIND)
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long, value_enum, default_value_t = GenerateMode::Practical)]
    mode: GenerateMode,
    /// The practical or experiment to plan
    question: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Generate(args) => run_generate(args).await,
        Commands::InitConfig => run_init_config(),
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load();
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    server::serve(config).await
}

async fn run_generate(args: GenerateArgs) -> Result<()> {
    let config = Config::load();
    let api_key = resolve_api_key()?;
    let client = GeminiClient::new(api_key, &config)?;
    let generator = PlanGenerator::new(client, &config);

    let request = GenerateRequest {
        mode: args.mode,
        question: args.question,
    };
    let result = handle_generate(&generator, &request).await;
    let failed = result.is_err();
    let response = GenerateResponse::from(result);

    let rendered =
        serde_json::to_string_pretty(&response).context("Failed to render response")?;
    println!("{}", rendered);

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_init_config() -> Result<()> {
    let path = Config::default()
        .save()
        .with_context(|| format!("Failed to write {}", Config::config_location()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
