use anyhow::Result;
use clap::Parser;
use parley_cli::{app, health, App, StartOptions, Theme};
use parley_core::{config, ParleyError, Settings};
use std::path::Path;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "parley - chat with OpenAI and Anthropic models from the terminal")]
#[command(version)]
struct Cli {
    /// Write a .env.sample template to the current directory and exit
    #[arg(long)]
    create_env: bool,

    /// Check API keys and storage, then exit
    #[arg(long)]
    health_check: bool,

    /// Provider to start with (openai, anthropic)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to start with
    #[arg(short, long)]
    model: Option<String>,

    /// Stream responses as they arrive
    #[arg(short, long)]
    stream: bool,

    /// Resume a saved session by id, prefix or title
    #[arg(short, long)]
    resume: Option<String>,

    /// Color theme (dark, tokyo-night, dracula)
    #[arg(long)]
    theme: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.create_env {
        let path = Path::new(".env.sample");
        if config::write_env_sample(path)? {
            println!("Wrote {}. Copy it to .env and fill in your API keys.", path.display());
        } else {
            println!("{} already exists; leaving it untouched.", path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.health_check {
        let report = health::run(&settings);
        println!("{report}");
        return Ok(if report.healthy() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let theme_name = cli.theme.clone().unwrap_or_else(|| settings.theme.clone());
    let theme = Theme::by_name(&theme_name).unwrap_or_else(|| {
        eprintln!("Unknown theme '{theme_name}', using dark.");
        Theme::default()
    });

    let options = StartOptions {
        provider: cli.provider,
        model: cli.model,
        stream: cli.stream || settings.stream,
        resume: cli.resume,
    };

    let engine = match app::build_engine(&settings, &options) {
        Ok(engine) => engine,
        Err(ParleyError::Config(msg)) => {
            eprintln!("{msg}");
            eprintln!();
            eprintln!("Set OPENAI_API_KEY or ANTHROPIC_API_KEY in your environment or a .env file.");
            eprintln!("Run `parley --create-env` to write a template, then `parley --health-check`.");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(provider = %engine.provider(), model = engine.model(), "starting session");
    let mut app = App::new(engine, theme);
    app.run(options.resume.as_deref()).await?;
    Ok(ExitCode::SUCCESS)
}
