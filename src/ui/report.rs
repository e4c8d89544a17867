use std::io;
use std::path::{Path, PathBuf};

use pulldown_cmark::{escape::escape_html, html, Event, Options, Parser};
use serde::Serialize;

use crate::i18n::ui_text;
use crate::types::{GeneratedResult, Language, Mode};

pub const REPORT_FILE_NAME: &str = "report.html";
pub const RESULT_FILE_NAME: &str = "result.json";

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2rem auto;padding:0 1rem;color:#222}\
img{max-width:100%;border-radius:8px}\
.concepts{display:grid;grid-template-columns:repeat(auto-fit,minmax(260px,1fr));gap:1rem}\
.concept{border:1px solid #ddd;border-radius:8px;padding:1rem}";

/// Model text is untrusted, so raw HTML in it is shown as text.
fn markdown_to_html(text: &str) -> String {
    let events = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH).map(|event| match event {
        Event::Html(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, events);
    out
}

fn escaped(text: &str) -> io::Result<String> {
    let mut out = String::new();
    escape_html(&mut out, text)?;
    Ok(out)
}

/// A standalone HTML page with the result's text and inlined images.
pub fn render_report(result: &GeneratedResult, language: Language) -> io::Result<String> {
    let text = ui_text(language);
    let mut body = String::new();

    match result {
        GeneratedResult::Annotated(response) => {
            body.push_str(&format!("<h2>{}</h2>\n", escaped(text.ai_response_title)?));
            if let Some(image) = &response.image {
                body.push_str(&format!(
                    "<img src=\"{}\" alt=\"{}\">\n",
                    escaped(image)?,
                    escaped(text.ai_response_title)?
                ));
            }
            body.push_str(&markdown_to_html(&response.text));
        }
        GeneratedResult::Concepts { concepts } => {
            body.push_str(&format!("<h2>{}</h2>\n", escaped(text.concepts_title)?));
            body.push_str("<div class=\"concepts\">\n");
            for concept in concepts {
                let name = escaped(&concept.name)?;
                body.push_str(&format!(
                    "<div class=\"concept\">\n<img src=\"{}\" alt=\"{}\">\n<h3>{}</h3>\n{}</div>\n",
                    escaped(&concept.image)?,
                    name,
                    name,
                    markdown_to_html(&concept.description)
                ));
            }
            body.push_str("</div>\n");
        }
    }

    Ok(format!(
        "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n<h1>{}</h1>\n{}</body>\n</html>\n",
        language.as_str(),
        escaped(text.title)?,
        STYLE,
        escaped(text.title)?,
        body
    ))
}

pub async fn write_report(
    result: &GeneratedResult,
    language: Language,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    let html = render_report(result, language)?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(REPORT_FILE_NAME);
    tokio::fs::write(&path, html).await?;
    Ok(path)
}

#[derive(Serialize)]
struct ResultRecord<'a> {
    mode: Mode,
    language: Language,
    result: &'a GeneratedResult,
}

/// Writes the result as JSON next to the HTML report, for scripting.
pub async fn write_result_json(
    result: &GeneratedResult,
    language: Language,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    let record = ResultRecord {
        mode: result.mode(),
        language,
        result,
    };
    let json = serde_json::to_string_pretty(&record)?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(RESULT_FILE_NAME);
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::{AnnotatedResponse, Concept};

    #[test]
    fn annotated_report_renders_markdown_and_inlines_the_image() {
        let result = GeneratedResult::Annotated(AnnotatedResponse {
            text: "* Turn **left**".to_string(),
            image: Some("data:image/png;base64,AAAA".to_string()),
        });
        let html = render_report(&result, Language::En).unwrap();
        assert!(html.contains("<li>Turn <strong>left</strong></li>"));
        assert!(html.contains("src=\"data:image/png;base64,AAAA\""));
        assert!(html.contains("<h2>AI Posing Guide</h2>"));
        assert!(html.contains("lang=\"en\""));
    }

    #[test]
    fn concept_names_are_escaped() {
        let result = GeneratedResult::Concepts {
            concepts: vec![Concept {
                name: "<Bold> & Bright".to_string(),
                description: "Stand tall.".to_string(),
                image: "data:image/png;base64,BBBB".to_string(),
            }],
        };
        let html = render_report(&result, Language::Vi).unwrap();
        assert!(html.contains("<h3>&lt;Bold&gt; &amp; Bright</h3>"));
        assert!(html.contains("<p>Stand tall.</p>"));
        assert!(html.contains(ui_text(Language::Vi).concepts_title));
    }

    #[test]
    fn model_html_and_image_uris_cannot_inject_markup() {
        let result = GeneratedResult::Annotated(AnnotatedResponse {
            text: "Turn left <script>alert(1)</script>\n\n<img src=x onerror=alert(2)>".to_string(),
            image: Some("data:image/png\"><script>alert(3)</script>;base64,AA".to_string()),
        });
        let html = render_report(&result, Language::En).unwrap();
        assert!(!html.contains("<script"));
        assert!(!html.contains("<img src=x"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("src=\"data:image/png&quot;&gt;&lt;script&gt;"));

        let concepts = GeneratedResult::Concepts {
            concepts: vec![Concept {
                name: "Lean".to_string(),
                description: "<iframe src=x></iframe>".to_string(),
                image: "data:image/png\" onload=\"alert(4)".to_string(),
            }],
        };
        let html = render_report(&concepts, Language::En).unwrap();
        assert!(!html.contains("<iframe"));
        assert!(!html.contains("\" onload=\""));
    }

    #[tokio::test]
    async fn report_is_written_to_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = GeneratedResult::Annotated(AnnotatedResponse {
            text: "ok".to_string(),
            image: None,
        });
        let path = write_report(&result, Language::En, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join(REPORT_FILE_NAME));
        assert!(std::fs::read_to_string(path).unwrap().contains("<p>ok</p>"));
    }

    #[tokio::test]
    async fn result_json_is_tagged_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let result = GeneratedResult::Concepts {
            concepts: vec![Concept {
                name: "Lean".to_string(),
                description: "Rest on the rail.".to_string(),
                image: "data:image/png;base64,BBBB".to_string(),
            }],
        };
        let path = write_result_json(&result, Language::Vi, dir.path())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join(RESULT_FILE_NAME));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["mode"], "improve");
        assert_eq!(json["language"], "vi");
        assert_eq!(json["result"]["kind"], "concepts");
        assert_eq!(json["result"]["concepts"][0]["name"], "Lean");

        let annotated = GeneratedResult::Annotated(AnnotatedResponse {
            text: "ok".to_string(),
            image: None,
        });
        let path = write_result_json(&annotated, Language::En, dir.path())
            .await
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["mode"], "recreate");
        assert_eq!(json["result"]["kind"], "annotated");
        assert_eq!(json["result"]["text"], "ok");
        assert!(json["result"]["image"].is_null());
    }
}
