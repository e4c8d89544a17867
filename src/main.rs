use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod acquire;
mod config;
mod i18n;
mod llm;
mod parser;
mod prompts;
mod session;
mod types;
mod ui;
mod utils;

use acquire::{CameraDevice, ImageSource};
use config::CONFIG;
use i18n::ui_text;
use llm::GeminiClient;
use session::{generate_result, Session};
use types::{ImageSlot, Language, Mode};
use ui::interactive::InteractiveApp;
use ui::progress::start_loading_indicator;
use ui::{cancel_on_ctrl_c, present_outcome, stdout_is_terminal};
use utils::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "pose-coach", version, about = "AI posing assistant backed by Gemini")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Response and interface language (vi or en).
    #[arg(long = "lang")]
    language: Option<Language>,
    /// Directory for saved images and the HTML report.
    #[arg(long = "out")]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Get step-by-step guidance to recreate a target pose.
    Recreate {
        /// Target pose image path, or `camera`.
        #[arg(long)]
        target: ImageSource,
        /// Your own photo path, or `camera`.
        #[arg(long)]
        model: ImageSource,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Get illustrated posing concepts for a scene.
    Improve {
        /// Scene image path, or `camera`.
        #[arg(long)]
        scene: ImageSource,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Start an interactive session in the terminal.
    Interactive {
        #[command(flatten)]
        common: CommonArgs,
    },
}

struct RunSettings {
    language: Language,
    output_dir: PathBuf,
    styled: bool,
}

impl RunSettings {
    fn from_args(common: &CommonArgs) -> Self {
        RunSettings {
            language: common.language.unwrap_or(CONFIG.default_language),
            output_dir: common
                .output_dir
                .clone()
                .unwrap_or_else(|| CONFIG.output_dir.clone()),
            styled: stdout_is_terminal(),
        }
    }
}

fn gemini_client() -> anyhow::Result<GeminiClient> {
    if !CONFIG.has_api_key() {
        bail!("GEMINI_API_KEY is not set");
    }
    Ok(GeminiClient::from_config(&CONFIG))
}

fn camera_device() -> anyhow::Result<CameraDevice> {
    CameraDevice::from_command(&CONFIG.camera_command, CONFIG.camera_max_frame_bytes)
        .context("Invalid POSE_CAMERA_COMMAND")
}

async fn run_once(
    mode: Mode,
    sources: Vec<(ImageSlot, ImageSource)>,
    settings: RunSettings,
) -> anyhow::Result<()> {
    let client = gemini_client()?;
    let camera = camera_device()?;
    let text = ui_text(settings.language);

    let mut session = Session::new(settings.language);
    session.select_mode(mode);

    for (slot, source) in sources {
        let ticket = session.begin_image_load(slot);
        if source == ImageSource::Camera {
            eprintln!("{} ({})", text.capture, text.slot_label(mode, slot));
        }
        let cancel = CancellationToken::new();
        let result = cancel_on_ctrl_c(source.acquire(&camera, &cancel), &cancel).await;
        if let Err(err) = &result {
            eprintln!("{}: {}", text.error_title, err.user_message(settings.language));
            error!("Could not acquire {:?} image: {err}", slot);
        }
        session.finish_image_load(ticket, result);
    }

    let request = session
        .begin_submission()
        .map_err(|rejected| anyhow!("Cannot submit: {rejected}"))?;

    let cancel = CancellationToken::new();
    let indicator = start_loading_indicator(text.generating, settings.styled);
    let result = cancel_on_ctrl_c(generate_result(&client, &request, &cancel), &cancel).await;
    drop(indicator);

    let failed = result.is_err();
    session.complete_submission(result);
    if let Some(outcome) = session.outcome() {
        present_outcome(outcome, settings.language, &settings.output_dir, settings.styled).await;
    }
    if failed {
        bail!("Generation failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let _logging_guards = init_logging();

    info!("Starting pose coach");

    match cli.command {
        CliCommand::Recreate {
            target,
            model,
            common,
        } => {
            run_once(
                Mode::Recreate,
                vec![(ImageSlot::Target, target), (ImageSlot::Model, model)],
                RunSettings::from_args(&common),
            )
            .await
        }
        CliCommand::Improve { scene, common } => {
            run_once(
                Mode::Improve,
                vec![(ImageSlot::Target, scene)],
                RunSettings::from_args(&common),
            )
            .await
        }
        CliCommand::Interactive { common } => {
            let settings = RunSettings::from_args(&common);
            let mut app = InteractiveApp::new(
                settings.language,
                gemini_client()?,
                camera_device()?,
                settings.output_dir,
                CONFIG.log_dir.clone(),
                settings.styled,
            );
            app.run().await
        }
    }
}
