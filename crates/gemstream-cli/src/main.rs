use clap::{Parser, Subcommand};
use gemstream::{run_flow, AppConfig, FileSource, FlowOutcome, FormSlot, OutputRegion, Submission};
use log::error;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "gemstream",
    version,
    about = "Stream Gemini answers for text, image and PDF prompts"
)]
struct Cli {
    /// Config file (defaults to the per-user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the web page with the three forms
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Send a text prompt
    Text { prompt: String },
    /// Send an image with an optional prompt
    Image {
        file: PathBuf,
        #[arg(default_value = "")]
        prompt: String,
    },
    /// Send a PDF with an optional prompt
    Pdf {
        file: PathBuf,
        #[arg(default_value = "")]
        prompt: String,
    },
}

/// Keeps the latest rendering; printed once the flow ends.
#[derive(Default)]
struct TerminalRegion {
    shown: Mutex<String>,
}

impl TerminalRegion {
    fn take(&self) -> String {
        std::mem::take(&mut *self.shown.lock())
    }
}

impl OutputRegion for TerminalRegion {
    fn replace(&self, html: String) {
        *self.shown.lock() = html;
    }

    fn append(&self, html: String) {
        self.shown.lock().push_str(&html);
    }
}

fn load_config(cli: &Cli) -> gemstream::EngineResult<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(key) = &cli.api_key {
        config.api_key = key.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn one_shot(config: &AppConfig, submission: Submission) -> ExitCode {
    let service = gemstream::engine::providers::from_config(config);
    let region = TerminalRegion::default();
    let outcome = run_flow(
        service.as_ref(),
        &config.generation_settings(),
        &FormSlot::new(),
        &region,
        submission,
    )
    .await;

    println!("{}", region.take());
    match outcome {
        FlowOutcome::Completed { .. } => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            tokio::select! {
                res = gemstream::serve(&config) => {
                    if let Err(e) = res {
                        error!("{}", e);
                        return ExitCode::FAILURE;
                    }
                    ExitCode::SUCCESS
                }
                _ = tokio::signal::ctrl_c() => ExitCode::SUCCESS,
            }
        }
        Command::Text { prompt } => one_shot(&config, Submission::text(prompt)).await,
        Command::Image { file, prompt } => {
            one_shot(&config, Submission::image(Some(FileSource::Path(file)), prompt)).await
        }
        Command::Pdf { file, prompt } => {
            one_shot(&config, Submission::document(Some(FileSource::Path(file)), prompt)).await
        }
    }
}
