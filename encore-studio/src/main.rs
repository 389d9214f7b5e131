mod app;
mod shell;

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use encore_core::config::{config_path, load_config, load_config_from, save_config};
use encore_core::{
    GenerationRequest, Locale, ModelLoader, ModelVariant, OnnxModelLoader, SineLoader, Studio,
    StudioConfig,
};

use crate::app::StudioModel;

#[derive(Parser)]
#[command(name = "encore")]
#[command(about = "Text-to-music studio with stem separation", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file to read instead of the user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory that holds session folders and the shared ledger
    #[arg(long, global = true)]
    sessions_dir: Option<PathBuf>,

    /// Directory with the exported MusicGen models
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Interpreter used to run the separator
    #[arg(long, global = true)]
    interpreter: Option<PathBuf>,

    /// Render sine tones instead of running the models
    #[arg(long, global = true)]
    synthetic: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive studio (default)
    Shell,

    /// Generate three clips and exit
    Generate {
        #[arg(short, long, value_parser = parse_model)]
        model: Option<ModelVariant>,

        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=30))]
        duration: Option<u32>,

        #[arg(required = true, trailing_var_arg = true)]
        description: Vec<String>,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to the user config file
        #[arg(long)]
        save: bool,
    },
}

fn parse_model(s: &str) -> Result<ModelVariant, String> {
    s.parse().map_err(|e: encore_core::Error| e.to_string())
}

fn effective_config(cli: &Cli) -> StudioConfig {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    if let Some(dir) = &cli.sessions_dir {
        config.sessions_root = dir.clone();
    }
    if let Some(dir) = &cli.models_dir {
        config.models_dir = dir.clone();
    }
    if let Some(interpreter) = &cli.interpreter {
        config.separator.interpreter = interpreter.clone();
    }
    config
}

fn build_studio(config: StudioConfig, synthetic: bool) -> Studio {
    let loader: Box<dyn ModelLoader> = if synthetic {
        log::info!("using synthetic generator");
        Box::new(SineLoader::default())
    } else {
        Box::new(OnnxModelLoader::new(config.models_dir.clone()))
    };
    Studio::new(config, loader)
}

fn handle_generate(
    mut studio: Studio,
    model: Option<ModelVariant>,
    duration: Option<u32>,
    description: Vec<String>,
) -> Result<()> {
    let request = GenerationRequest::new(
        description.join(" "),
        duration.unwrap_or(studio.config().default_duration),
        model.unwrap_or(studio.config().default_model),
    );
    let outcome = studio
        .generate(&request)
        .context("could not start a session")?;
    if let Some(error) = outcome.error {
        bail!(error);
    }

    if let Some(session) = studio.session() {
        eprintln!("Session: {}", session.dir().display());
    }
    for clip in outcome.clips.iter().flatten() {
        println!("{}", clip.display());
    }
    eprintln!("{}", outcome.status.bright_green());
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    Locale::validate_all().map_err(anyhow::Error::msg)?;

    let config = effective_config(&cli);
    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            let studio = build_studio(config, cli.synthetic);
            shell::run(StudioModel::new(studio))
        }
        Commands::Generate {
            model,
            duration,
            description,
        } => handle_generate(build_studio(config, cli.synthetic), model, duration, description),
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                save_config(&config)?;
                eprintln!("Saved {}", config_path().display());
            }
            Ok(())
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{}", format!("Error: {:#}", e).red());
        process::exit(1);
    }
}
