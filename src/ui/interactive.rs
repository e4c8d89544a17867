use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acquire::{read_image_file, CameraDevice, SlotInput};
use crate::i18n::ui_text;
use crate::llm::GeminiClient;
use crate::session::{generate_result, LoadOutcome, Session};
use crate::types::{ImageSlot, Language, Mode};
use crate::ui::progress::start_loading_indicator;
use crate::ui::{cancel_on_ctrl_c, format_snapshot, present_outcome};
use crate::utils::logging::{read_recent_log_lines, GENERAL_LOG_BASE};

const DEFAULT_LOG_LINES: usize = 20;
const MAX_LOG_LINES: usize = 200;

const HELP: &str = "Commands:
  mode <recreate|improve>   choose what to do (clears images)
  lang <vi|en>              switch language
  upload <slot> <path>      load an image file into a slot (target/scene, model)
  camera <slot>             open the camera for a slot
  capture                   take the photo from the open camera
  close                     close the camera
  submit                    send the images to the model
  status                    show the current state
  logs [n]                  show the last n log lines
  help                      show this text
  quit                      exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Mode(Mode),
    Lang(Language),
    Upload(ImageSlot, PathBuf),
    Camera(ImageSlot),
    Capture,
    Close,
    Submit,
    Status,
    Logs(usize),
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    let Some((name, rest)) = split_word(line) else {
        return Ok(None);
    };

    let command = match name.to_lowercase().as_str() {
        "mode" => Command::Mode(required_word(rest, "mode")?.parse()?),
        "lang" | "language" => Command::Lang(required_word(rest, "language")?.parse()?),
        "upload" => {
            let (slot, path) =
                split_word(rest).ok_or_else(|| anyhow!("Usage: upload <slot> <path>"))?;
            if path.is_empty() {
                bail!("Usage: upload <slot> <path>");
            }
            Command::Upload(slot.parse()?, PathBuf::from(path))
        }
        "camera" => Command::Camera(required_word(rest, "slot")?.parse()?),
        "capture" | "snap" => Command::Capture,
        "close" => Command::Close,
        "submit" | "generate" => Command::Submit,
        "status" => Command::Status,
        "logs" => {
            let count = if rest.is_empty() {
                DEFAULT_LOG_LINES
            } else {
                rest.parse::<usize>()
                    .map_err(|_| anyhow!("Invalid line count: {rest}"))?
            };
            Command::Logs(count.clamp(1, MAX_LOG_LINES))
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("Unknown command '{other}'. Type 'help' for the list."),
    };
    Ok(Some(command))
}

fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((text, "")),
    }
}

fn required_word<'a>(rest: &'a str, what: &str) -> Result<&'a str> {
    split_word(rest)
        .map(|(word, _)| word)
        .ok_or_else(|| anyhow!("Missing {what}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct InteractiveApp {
    session: Session,
    client: GeminiClient,
    camera: CameraDevice,
    inputs: [SlotInput; 2],
    output_dir: PathBuf,
    log_dir: PathBuf,
    styled: bool,
}

impl InteractiveApp {
    pub fn new(
        language: Language,
        client: GeminiClient,
        camera: CameraDevice,
        output_dir: PathBuf,
        log_dir: PathBuf,
        styled: bool,
    ) -> Self {
        InteractiveApp {
            session: Session::new(language),
            client,
            camera,
            inputs: Default::default(),
            output_dir,
            log_dir,
            styled,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn language(&self) -> Language {
        self.session.language()
    }

    fn live_slot(&self) -> Option<ImageSlot> {
        ImageSlot::ALL
            .into_iter()
            .find(|slot| self.inputs[slot.index()].is_camera())
    }

    fn close_cameras(&mut self) {
        for input in &mut self.inputs {
            input.switch_to_upload();
        }
    }

    fn print_status(&self) {
        print!("{}", format_snapshot(&self.session.snapshot()));
    }

    fn check_slot(&self, slot: ImageSlot) -> Result<()> {
        match self.session.mode() {
            Some(mode) if mode.uses_slot(slot) => Ok(()),
            Some(mode) => bail!("Mode {mode} has no {slot:?} image"),
            None => bail!("{}", ui_text(self.language()).select_mode),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.print_status();
        println!("{HELP}");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            let command = match parse_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(err) => {
                    eprintln!("{err}");
                    continue;
                }
            };

            if self.handle(command).await? == Flow::Quit {
                break;
            }
        }

        self.close_cameras();
        info!("Interactive session ended");
        Ok(())
    }

    pub async fn handle(&mut self, command: Command) -> Result<Flow> {
        let text = ui_text(self.language());
        match command {
            Command::Mode(mode) => {
                self.close_cameras();
                self.session.select_mode(mode);
                self.print_status();
            }
            Command::Lang(language) => {
                self.session.set_language(language);
                self.print_status();
            }
            Command::Upload(slot, path) => {
                if let Err(err) = self.check_slot(slot) {
                    eprintln!("{err}");
                    return Ok(Flow::Continue);
                }
                self.inputs[slot.index()].switch_to_upload();
                let ticket = self.session.begin_image_load(slot);
                let result = read_image_file(&path).await;
                let message = result
                    .as_ref()
                    .err()
                    .map(|err| err.user_message(self.language()));
                if self.session.finish_image_load(ticket, result) == LoadOutcome::Failed {
                    eprintln!("{}: {}", text.error_title, message.unwrap_or(text.file_error));
                }
                self.print_status();
            }
            Command::Camera(slot) => {
                if let Err(err) = self.check_slot(slot) {
                    eprintln!("{err}");
                    return Ok(Flow::Continue);
                }
                self.close_cameras();
                match self.inputs[slot.index()].start_camera(&self.camera) {
                    Ok(()) => println!("{}", text.camera_live),
                    Err(err) => {
                        eprintln!("{}", err.user_message(self.language()));
                        let ticket = self.session.begin_image_load(slot);
                        self.session.finish_image_load(ticket, Err(err));
                    }
                }
            }
            Command::Capture => {
                let Some(slot) = self.live_slot() else {
                    eprintln!("{}", text.upload_instruction);
                    return Ok(Flow::Continue);
                };
                let cancel = CancellationToken::new();
                let ticket = self.session.begin_image_load(slot);
                let result =
                    cancel_on_ctrl_c(self.inputs[slot.index()].capture(&cancel), &cancel).await;
                let message = result
                    .as_ref()
                    .err()
                    .map(|err| err.user_message(self.language()));
                if self.session.finish_image_load(ticket, result) == LoadOutcome::Failed {
                    eprintln!("{}", message.unwrap_or(text.camera_error));
                }
                self.print_status();
            }
            Command::Close => {
                self.close_cameras();
                self.print_status();
            }
            Command::Submit => self.submit().await,
            Command::Status => self.print_status(),
            Command::Logs(count) => match read_recent_log_lines(&self.log_dir, GENERAL_LOG_BASE, count) {
                Ok(Some(tail)) => {
                    println!("{}", tail.path.display());
                    for line in tail.lines {
                        println!("{line}");
                    }
                }
                Ok(None) => println!("No log file in {}", self.log_dir.display()),
                Err(err) => eprintln!("Failed to read logs: {err}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn submit(&mut self) {
        let text = ui_text(self.language());
        let request = match self.session.begin_submission() {
            Ok(request) => request,
            Err(rejected) => {
                warn!("Submission rejected: {rejected}");
                eprintln!("{}", text.generate_disabled);
                return;
            }
        };

        let cancel = CancellationToken::new();
        let indicator = start_loading_indicator(text.generating, self.styled);
        let result = cancel_on_ctrl_c(generate_result(&self.client, &request, &cancel), &cancel).await;
        drop(indicator);

        self.session.complete_submission(result);
        if let Some(outcome) = self.session.outcome() {
            present_outcome(outcome, request.language, &self.output_dir, self.styled).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::Phase;

    fn app(dir: &std::path::Path) -> InteractiveApp {
        InteractiveApp::new(
            Language::En,
            GeminiClient::new("key", "http://127.0.0.1:9", "model", "standard"),
            CameraDevice::new("sh", vec!["-c".into(), "sleep 30".into()], 1024),
            dir.join("out"),
            dir.join("logs"),
            false,
        )
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("mode Improve").unwrap(),
            Some(Command::Mode(Mode::Improve))
        );
        assert_eq!(
            parse_command("upload model  photos/my pic.jpg").unwrap(),
            Some(Command::Upload(ImageSlot::Model, PathBuf::from("photos/my pic.jpg")))
        );
        assert_eq!(
            parse_command("camera scene").unwrap(),
            Some(Command::Camera(ImageSlot::Target))
        );
        assert_eq!(parse_command("logs").unwrap(), Some(Command::Logs(DEFAULT_LOG_LINES)));
        assert_eq!(parse_command("logs 5000").unwrap(), Some(Command::Logs(MAX_LOG_LINES)));
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(parse_command("mode").is_err());
        assert!(parse_command("upload target").is_err());
        assert!(parse_command("dance").is_err());
        assert!(parse_command("logs many").is_err());
    }

    #[tokio::test]
    async fn uploads_fill_slots_and_mode_change_clears_them() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("scene.png");
        std::fs::write(
            &image_path,
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, 0x49, 0x48, 0x44, 0x52],
        )
        .unwrap();

        let mut app = app(dir.path());
        app.handle(Command::Mode(Mode::Improve)).await.unwrap();
        app.handle(Command::Upload(ImageSlot::Target, image_path))
            .await
            .unwrap();
        assert!(app.session().can_submit());

        app.handle(Command::Mode(Mode::Recreate)).await.unwrap();
        assert!(app.session().image(ImageSlot::Target).is_none());
    }

    #[tokio::test]
    async fn failed_upload_leaves_slot_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.handle(Command::Mode(Mode::Improve)).await.unwrap();
        app.handle(Command::Upload(ImageSlot::Target, dir.path().join("missing.png")))
            .await
            .unwrap();
        assert!(app.session().image(ImageSlot::Target).is_none());
        assert_eq!(
            app.session().snapshot().slots[0].error,
            Some(ui_text(Language::En).file_error)
        );
    }

    #[tokio::test]
    async fn mode_change_closes_the_camera() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.handle(Command::Mode(Mode::Recreate)).await.unwrap();
        app.handle(Command::Camera(ImageSlot::Model)).await.unwrap();
        assert_eq!(app.camera.active_tracks(), 1);
        assert_eq!(app.live_slot(), Some(ImageSlot::Model));

        app.handle(Command::Camera(ImageSlot::Target)).await.unwrap();
        assert_eq!(app.camera.active_tracks(), 1);
        assert_eq!(app.live_slot(), Some(ImageSlot::Target));

        app.handle(Command::Mode(Mode::Improve)).await.unwrap();
        assert_eq!(app.camera.active_tracks(), 0);
        assert_eq!(app.live_slot(), None);
    }

    #[tokio::test]
    async fn camera_for_unused_slot_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.handle(Command::Mode(Mode::Improve)).await.unwrap();
        app.handle(Command::Camera(ImageSlot::Model)).await.unwrap();
        assert_eq!(app.camera.active_tracks(), 0);
    }

    #[tokio::test]
    async fn submit_without_images_stays_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.handle(Command::Mode(Mode::Recreate)).await.unwrap();
        app.handle(Command::Submit).await.unwrap();
        assert_eq!(app.session().phase(), Phase::Idle);
        assert!(app.session().outcome().is_none());
    }

    #[tokio::test]
    async fn quit_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        assert_eq!(app.handle(Command::Quit).await.unwrap(), Flow::Quit);
    }
}
