use crate::prompts::CONCEPT_BREAK;
use crate::types::{data_uri, AnnotatedResponse, Concept, GeneratedResult, Mode, ResponsePart};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("model did not return enough content (text_len={text_len}, images={images})")]
    IncompleteResponse { text_len: usize, images: usize },
}

pub fn parse_response(mode: Mode, parts: &[ResponsePart]) -> Result<GeneratedResult, ParseError> {
    match mode {
        Mode::Recreate => Ok(GeneratedResult::Annotated(parse_recreate(parts))),
        Mode::Improve => parse_improve(parts).map(|concepts| GeneratedResult::Concepts { concepts }),
    }
}

fn concatenated_text(parts: &[ResponsePart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            ResponsePart::Text(text) => Some(text.as_str()),
            ResponsePart::InlineImage { .. } => None,
        })
        .collect()
}

fn image_uris(parts: &[ResponsePart]) -> impl Iterator<Item = String> + '_ {
    parts.iter().filter_map(|part| match part {
        ResponsePart::InlineImage { data, mime_type } => Some(data_uri(mime_type, data)),
        ResponsePart::Text(_) => None,
    })
}

/// Text parts are joined verbatim; the first image, if any, is the annotated
/// copy of the user's photo.
pub fn parse_recreate(parts: &[ResponsePart]) -> AnnotatedResponse {
    AnnotatedResponse {
        text: concatenated_text(parts),
        image: image_uris(parts).next(),
    }
}

/// Pairs concept text blocks with images by position. Surplus blocks or
/// images are dropped; only a response with no text or no images at all is
/// an error.
pub fn parse_improve(parts: &[ResponsePart]) -> Result<Vec<Concept>, ParseError> {
    let text = concatenated_text(parts);
    let images: Vec<String> = image_uris(parts).collect();

    if text.is_empty() || images.is_empty() {
        return Err(ParseError::IncompleteResponse {
            text_len: text.len(),
            images: images.len(),
        });
    }

    let segments: Vec<&str> = text
        .split(CONCEPT_BREAK)
        .filter(|segment| !segment.trim().is_empty())
        .collect();

    let concepts = segments
        .into_iter()
        .zip(images)
        .map(|(segment, image)| {
            let segment = segment.trim();
            let (name, rest) = segment.split_once('\n').unwrap_or((segment, ""));
            Concept {
                name: name.trim().to_string(),
                description: rest.trim().to_string(),
                image,
            }
        })
        .collect();

    Ok(concepts)
}
