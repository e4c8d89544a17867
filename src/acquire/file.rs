use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

use crate::acquire::AcquireError;
use crate::llm::media::{detect_mime_type, is_image_mime, mime_from_extension, normalize_image_mime_type};
use crate::types::ImageFile;

pub async fn read_image_file(path: &Path) -> Result<ImageFile, AcquireError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AcquireError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    let image = image_from_bytes(&bytes, &name, mime_from_extension(path))?;
    debug!(
        "Loaded {} ({} bytes, {})",
        image.name,
        bytes.len(),
        image.mime_type
    );
    Ok(image)
}

/// Content sniffing wins over the extension; anything that is not `image/*`
/// is refused.
pub fn image_from_bytes(
    bytes: &[u8],
    name: &str,
    fallback_mime: Option<&str>,
) -> Result<ImageFile, AcquireError> {
    if bytes.is_empty() {
        return Err(AcquireError::EmptyFile(name.to_string()));
    }

    let mime_type = detect_mime_type(bytes)
        .or_else(|| fallback_mime.map(str::to_string))
        .map(|mime| normalize_image_mime_type(&mime))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    if !is_image_mime(&mime_type) {
        return Err(AcquireError::NotAnImage {
            name: name.to_string(),
            mime_type,
        });
    }

    Ok(ImageFile::new(
        general_purpose::STANDARD.encode(bytes),
        mime_type,
        name,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_BYTES: [u8; 12] = [
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01,
    ];

    #[tokio::test]
    async fn reads_and_encodes_an_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pose.jpeg");
        std::fs::write(&path, JPEG_BYTES).unwrap();

        let image = read_image_file(&path).await.unwrap();
        assert_eq!(image.name, "pose.jpeg");
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(
            general_purpose::STANDARD.decode(&image.data).unwrap(),
            JPEG_BYTES.to_vec()
        );
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_image_file(&dir.path().join("missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::FileRead { .. }));
    }

    #[test]
    fn content_sniffing_beats_the_extension() {
        let err = image_from_bytes(b"%PDF-1.7 not an image", "photo.png", Some("image/png"))
            .unwrap_err();
        assert!(matches!(
            err,
            AcquireError::NotAnImage { ref mime_type, .. } if mime_type == "application/pdf"
        ));
    }

    #[test]
    fn unknown_content_falls_back_to_the_extension() {
        let image = image_from_bytes(b"opaque bytes", "frame.webp", Some("image/webp")).unwrap();
        assert_eq!(image.mime_type, "image/webp");

        let err = image_from_bytes(b"opaque bytes", "notes", None).unwrap_err();
        assert!(matches!(err, AcquireError::NotAnImage { .. }));
    }

    #[test]
    fn empty_files_are_rejected() {
        assert!(matches!(
            image_from_bytes(&[], "blank.png", Some("image/png")),
            Err(AcquireError::EmptyFile(_))
        ));
    }
}
