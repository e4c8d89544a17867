use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Recreate,
    Improve,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Recreate => "recreate",
            Mode::Improve => "improve",
        }
    }

    /// Slots that must hold an image before this mode can be submitted, in
    /// the order the images are sent to the model.
    pub fn required_slots(&self) -> &'static [ImageSlot] {
        match self {
            Mode::Recreate => &[ImageSlot::Target, ImageSlot::Model],
            Mode::Improve => &[ImageSlot::Target],
        }
    }

    pub fn uses_slot(&self, slot: ImageSlot) -> bool {
        self.required_slots().contains(&slot)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "recreate" => Ok(Mode::Recreate),
            "improve" => Ok(Mode::Improve),
            other => Err(anyhow!("Unknown mode '{other}' (expected recreate or improve)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Vi,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Vi => "vi",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "vi" | "vietnamese" => Ok(Language::Vi),
            "en" | "english" => Ok(Language::En),
            other => Err(anyhow!("Unknown language '{other}' (expected vi or en)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Target,
    Model,
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 2] = [ImageSlot::Target, ImageSlot::Model];

    pub fn index(&self) -> usize {
        match self {
            ImageSlot::Target => 0,
            ImageSlot::Model => 1,
        }
    }
}

impl FromStr for ImageSlot {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "target" | "scene" | "pose" => Ok(ImageSlot::Target),
            "model" | "me" | "self" => Ok(ImageSlot::Model),
            other => Err(anyhow!("Unknown image slot '{other}' (expected target, scene or model)")),
        }
    }
}

/// A user-supplied image, base64 encoded. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub data: String,
    pub mime_type: String,
    pub name: String,
}

impl ImageFile {
    pub fn new(data: String, mime_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            name: name.into(),
        }
    }
}

pub fn data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

/// Splits `data:<mime>;base64,<payload>` into its MIME type and payload.
pub fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    Some((mime_type, payload))
}

/// One unit of a model response, kept in service order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Text(String),
    InlineImage { data: String, mime_type: String },
}

impl ResponsePart {
    pub fn text(value: impl Into<String>) -> Self {
        ResponsePart::Text(value.into())
    }

    pub fn image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        ResponsePart::InlineImage {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedResponse {
    pub text: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Concept {
    pub name: String,
    pub description: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneratedResult {
    Annotated(AnnotatedResponse),
    Concepts { concepts: Vec<Concept> },
}

impl GeneratedResult {
    pub fn mode(&self) -> Mode {
        match self {
            GeneratedResult::Annotated(_) => Mode::Recreate,
            GeneratedResult::Concepts { .. } => Mode::Improve,
        }
    }
}
