pub mod download;
pub mod interactive;
pub mod progress;
pub mod render;
pub mod report;

use std::future::Future;
use std::io::IsTerminal;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::i18n::ui_text;
use crate::session::{Phase, SessionSnapshot, SubmissionError};
use crate::types::{GeneratedResult, Language};

pub use render::{render_markdown, strip_control};

pub fn stdout_is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Runs `future` and cancels `cancel` if Ctrl-C arrives first. The future is
/// still awaited so it can observe the token and clean up.
pub async fn cancel_on_ctrl_c<F: Future>(future: F, cancel: &CancellationToken) -> F::Output {
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let output = future.await;
    watcher.abort();
    output
}

pub fn format_snapshot(snapshot: &SessionSnapshot) -> String {
    let text = ui_text(snapshot.language);
    let mut out = format!("== {} ==\n", text.title);

    let Some(mode) = snapshot.mode else {
        out.push_str(text.select_mode);
        out.push('\n');
        out.push_str(&format!("  - recreate: {}\n", text.recreate_description));
        out.push_str(&format!("  - improve:  {}\n", text.improve_description));
        return out;
    };

    out.push_str(&format!("{} [{}]\n", text.mode_name(mode), snapshot.language));
    for slot in &snapshot.slots {
        let line = match &slot.image {
            Some(image) => format!(
                "{} ({})  [{}]",
                image.name, image.mime_type, text.change_image
            ),
            None => format!("{}  [{} / {}]", text.empty_slot, text.upload, text.camera),
        };
        out.push_str(&format!("  {}: {}\n", slot.label, line));
        if let Some(error) = slot.error {
            out.push_str(&format!("    ! {error}\n"));
        }
    }

    let action = match (snapshot.phase, snapshot.can_submit) {
        (Phase::Submitting, _) => text.generating,
        (Phase::Idle, true) => text.generate,
        (Phase::Idle, false) => text.generate_disabled,
    };
    out.push_str(&format!("> {action}\n"));
    out
}

pub fn format_result(result: &GeneratedResult, language: Language, styled: bool) -> String {
    let text = ui_text(language);
    match result {
        GeneratedResult::Annotated(response) => format!(
            "## {}\n\n{}\n",
            text.ai_response_title,
            render_markdown(&response.text, styled)
        ),
        GeneratedResult::Concepts { concepts } => {
            let mut out = format!("## {}\n", text.concepts_title);
            for (index, concept) in concepts.iter().enumerate() {
                out.push_str(&format!(
                    "\n{}. {}\n{}\n",
                    index + 1,
                    strip_control(&concept.name),
                    render_markdown(&concept.description, styled)
                ));
            }
            out
        }
    }
}

/// Prints a submission outcome and, on success, saves its images, the HTML
/// report and `result.json` under `out_dir`. Failures show only the
/// localized message.
pub async fn present_outcome(
    outcome: &Result<GeneratedResult, SubmissionError>,
    language: Language,
    out_dir: &Path,
    styled: bool,
) {
    let text = ui_text(language);
    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            if err.is_cancelled() {
                warn!("Submission cancelled");
            } else {
                error!("Submission failed: {err}");
            }
            eprintln!("{}: {}", text.error_title, err.user_message(language));
            return;
        }
    };

    println!("{}", format_result(result, language, styled));

    match download::save_result_images(result, out_dir).await {
        Ok(paths) => {
            for path in paths {
                println!("{}: {}", text.saved_to, path.display());
            }
        }
        Err(err) => {
            error!("Failed to save images: {err:#}");
            eprintln!("{}: {err}", text.error_title);
        }
    }

    match report::write_report(result, language, out_dir).await {
        Ok(path) => println!("{}: {}", text.saved_to, path.display()),
        Err(err) => error!("Failed to write report: {err:#}"),
    }

    match report::write_result_json(result, language, out_dir).await {
        Ok(path) => println!("{}: {}", text.saved_to, path.display()),
        Err(err) => error!("Failed to write result JSON: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::Session;
    use crate::types::{AnnotatedResponse, Concept, ImageFile, ImageSlot, Mode};

    #[test]
    fn snapshot_without_mode_prompts_for_one() {
        let session = Session::new(Language::En);
        let rendered = format_snapshot(&session.snapshot());
        assert!(rendered.contains("Select a mode to get started."));
    }

    #[test]
    fn snapshot_lists_slots_and_gate() {
        let mut session = Session::new(Language::En);
        session.select_mode(Mode::Recreate);
        let ticket = session.begin_image_load(ImageSlot::Target);
        session.finish_image_load(
            ticket,
            Ok(ImageFile::new("AA==".into(), "image/png", "target.png")),
        );

        let rendered = format_snapshot(&session.snapshot());
        assert!(rendered.contains("Target Pose: target.png (image/png)"));
        assert!(rendered.contains("Your Image: (empty)"));
        assert!(rendered.contains(ui_text(Language::En).generate_disabled));
    }

    #[test]
    fn concepts_are_numbered() {
        let result = GeneratedResult::Concepts {
            concepts: vec![
                Concept {
                    name: "Lean".into(),
                    description: "Rest on the rail.".into(),
                    image: String::new(),
                },
                Concept {
                    name: "Walk".into(),
                    description: "Stride forward.".into(),
                    image: String::new(),
                },
            ],
        };
        let rendered = format_result(&result, Language::En, false);
        assert!(rendered.starts_with("## Creative Concepts\n"));
        assert!(rendered.contains("1. Lean\nRest on the rail.\n"));
        assert!(rendered.contains("2. Walk\nStride forward.\n"));
    }

    #[test]
    fn annotated_text_is_rendered() {
        let result = GeneratedResult::Annotated(AnnotatedResponse {
            text: "* Chin up".into(),
            image: None,
        });
        assert_eq!(
            format_result(&result, Language::En, false),
            "## AI Posing Guide\n\n• Chin up\n"
        );
    }

    #[test]
    fn concept_names_lose_escape_sequences() {
        let result = GeneratedResult::Concepts {
            concepts: vec![Concept {
                name: "Lean\x1b[2J".into(),
                description: "Rest.".into(),
                image: String::new(),
            }],
        };
        let rendered = format_result(&result, Language::En, false);
        assert!(rendered.contains("1. Lean[2J\nRest.\n"));
        assert!(!rendered.contains('\x1b'));
    }

    #[tokio::test]
    async fn cancel_on_ctrl_c_returns_the_future_output() {
        let cancel = CancellationToken::new();
        assert_eq!(cancel_on_ctrl_c(async { 5 }, &cancel).await, 5);
        assert!(!cancel.is_cancelled());
    }
}
