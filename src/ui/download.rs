use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::types::{split_data_uri, GeneratedResult};

pub const ANNOTATED_FILE_NAME: &str = "annotated-pose.png";

static NON_ALNUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid filename regex"));

/// `"Sunset Beach!! Pose"` becomes `sunset-beach-pose.png`.
pub fn concept_filename(name: &str) -> String {
    let lowered = name.to_lowercase();
    let slug = NON_ALNUM_RE.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "concept.png".to_string()
    } else {
        format!("{slug}.png")
    }
}

/// Filenames for every concept, with `-2`, `-3`... added to repeats so no
/// concept overwrites another.
pub fn unique_concept_filenames<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut used = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let base = concept_filename(name);
            let stem = base.trim_end_matches(".png").to_string();
            let mut candidate = base;
            let mut counter = 2;
            while !used.insert(candidate.clone()) {
                candidate = format!("{stem}-{counter}.png");
                counter += 1;
            }
            candidate
        })
        .collect()
}

fn wants_png(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

fn reencode_as_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes).context("Failed to decode generated image")?;
    let mut out = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(out)
}

/// Decodes a data URI and writes it under `dir`.
pub async fn save_image(data_uri: &str, dir: &Path, filename: &str) -> Result<PathBuf> {
    let (mime_type, payload) =
        split_data_uri(data_uri).ok_or_else(|| anyhow!("Not a base64 data URI"))?;
    let mut bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .context("Invalid base64 image data")?;

    if wants_png(filename) && !mime_type.eq_ignore_ascii_case("image/png") {
        debug!("Re-encoding {} image as PNG for {}", mime_type, filename);
        bytes = reencode_as_png(&bytes)?;
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(filename);
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Saved image to {}", path.display());
    Ok(path)
}

/// Saves every image in a result. Returns the written paths in display
/// order.
pub async fn save_result_images(result: &GeneratedResult, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut saved = Vec::new();
    match result {
        GeneratedResult::Annotated(response) => {
            if let Some(image) = &response.image {
                saved.push(save_image(image, dir, ANNOTATED_FILE_NAME).await?);
            }
        }
        GeneratedResult::Concepts { concepts } => {
            let filenames =
                unique_concept_filenames(concepts.iter().map(|concept| concept.name.as_str()));
            for (concept, filename) in concepts.iter().zip(filenames) {
                saved.push(save_image(&concept.image, dir, &filename).await?);
            }
        }
    }
    Ok(saved)
}
