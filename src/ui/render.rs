use pulldown_cmark::{Event, Options, Parser, Tag};

const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const RESET: &str = "\x1b[0m";

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn ensure_blank_line(out: &mut String) {
    if out.is_empty() {
        return;
    }
    ensure_newline(out);
    if !out.ends_with("\n\n") {
        out.push('\n');
    }
}

/// Drops control characters other than newline and tab, so model text
/// cannot carry its own terminal escape sequences.
pub fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

/// Renders model Markdown for a terminal. Bullets become `•`; emphasis is
/// only styled with ANSI codes when `styled` is set.
pub fn render_markdown(text: &str, styled: bool) -> String {
    let mut out = String::new();
    let mut lists: Vec<Option<u64>> = Vec::new();

    let style = |out: &mut String, code: &str| {
        if styled {
            out.push_str(code);
        }
    };

    for event in Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph => {
                    if lists.is_empty() {
                        ensure_blank_line(&mut out);
                    }
                }
                Tag::Heading(..) => {
                    ensure_blank_line(&mut out);
                    style(&mut out, BOLD);
                }
                Tag::List(start) => {
                    if lists.is_empty() {
                        ensure_blank_line(&mut out);
                    } else {
                        ensure_newline(&mut out);
                    }
                    lists.push(start);
                }
                Tag::Item => {
                    ensure_newline(&mut out);
                    out.push_str(&"  ".repeat(lists.len().saturating_sub(1)));
                    match lists.last_mut() {
                        Some(Some(number)) => {
                            out.push_str(&format!("{number}. "));
                            *number += 1;
                        }
                        _ => out.push_str("• "),
                    }
                }
                Tag::Strong => style(&mut out, BOLD),
                Tag::Emphasis => style(&mut out, ITALIC),
                _ => {}
            },
            Event::End(tag) => match tag {
                Tag::Heading(..) => {
                    style(&mut out, RESET);
                    out.push('\n');
                }
                Tag::List(_) => {
                    lists.pop();
                    ensure_newline(&mut out);
                }
                Tag::Strong | Tag::Emphasis => style(&mut out, RESET),
                _ => {}
            },
            Event::Text(text) | Event::Code(text) | Event::Html(text) => {
                out.push_str(&strip_control(&text))
            }
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => {
                ensure_blank_line(&mut out);
                out.push_str("────────\n");
            }
            _ => {}
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullets_and_bold_render_plain() {
        let text = "Try this:\n\n* Turn your **left** shoulder\n* Tilt your chin";
        assert_eq!(
            render_markdown(text, false),
            "Try this:\n\n• Turn your left shoulder\n• Tilt your chin"
        );
    }

    #[test]
    fn bold_is_styled_on_terminals() {
        let rendered = render_markdown("Keep your **back straight**.", true);
        assert_eq!(rendered, "Keep your \x1b[1mback straight\x1b[0m.");
    }

    #[test]
    fn ordered_lists_keep_their_numbers() {
        assert_eq!(
            render_markdown("3. Step back\n4. Smile", false),
            "3. Step back\n4. Smile"
        );
    }

    #[test]
    fn nested_lists_are_indented() {
        let rendered = render_markdown("* Arms\n  * Left up\n* Legs", false);
        assert_eq!(rendered, "• Arms\n  • Left up\n• Legs");
    }

    #[test]
    fn model_escape_sequences_are_stripped() {
        let rendered = render_markdown("Hi \x1b[31mred\x07 <b>bold</b>", true);
        assert_eq!(rendered, "Hi [31mred <b>bold</b>");

        let styled = render_markdown("**up**\x1b]0;title\x07", true);
        assert_eq!(styled, "\x1b[1mup\x1b[0m]0;title");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(render_markdown("Relax and breathe.", false), "Relax and breathe.");
        assert_eq!(render_markdown("", false), "");
    }
}
