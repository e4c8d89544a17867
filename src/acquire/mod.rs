pub mod camera;
pub mod file;

use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;

use crate::i18n::ui_text;
use crate::types::{ImageFile, Language};

pub use camera::{CameraDevice, CameraSession};
pub use file::read_image_file;

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("failed to read image {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} is not an image (detected {mime_type})")]
    NotAnImage { name: String, mime_type: String },
    #[error("{0} is empty")]
    EmptyFile(String),
    #[error("camera unavailable: {0}")]
    CameraAccess(String),
    #[error("camera capture failed: {0}")]
    CaptureFailed(String),
    #[error("camera capture cancelled")]
    Cancelled,
}

impl AcquireError {
    pub fn user_message(&self, language: Language) -> &'static str {
        let text = ui_text(language);
        match self {
            AcquireError::FileRead { .. }
            | AcquireError::NotAnImage { .. }
            | AcquireError::EmptyFile(_) => text.file_error,
            AcquireError::CameraAccess(_) | AcquireError::CaptureFailed(_) => text.camera_error,
            AcquireError::Cancelled => text.cancelled,
        }
    }
}

/// Input state of one image slot. Leaving camera mode in any way drops the
/// session, which stops the capture process.
#[derive(Debug, Default)]
pub enum SlotInput {
    #[default]
    Upload,
    Camera(CameraSession),
}

impl SlotInput {
    pub fn is_camera(&self) -> bool {
        matches!(self, SlotInput::Camera(_))
    }

    pub fn switch_to_upload(&mut self) {
        *self = SlotInput::Upload;
    }

    pub fn start_camera(&mut self, device: &CameraDevice) -> Result<(), AcquireError> {
        self.switch_to_upload();
        let session = device.open()?;
        *self = SlotInput::Camera(session);
        Ok(())
    }

    /// Captures one frame and returns the slot to upload mode, whatever the
    /// outcome.
    pub async fn capture(&mut self, cancel: &CancellationToken) -> Result<ImageFile, AcquireError> {
        match std::mem::take(self) {
            SlotInput::Camera(session) => session.capture(cancel).await,
            SlotInput::Upload => Err(AcquireError::CameraAccess(
                "camera is not open for this slot".to_string(),
            )),
        }
    }
}

/// Where a one-shot run takes an image from: a file path, or `camera`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Camera,
}

impl FromStr for ImageSource {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("camera") {
            Ok(ImageSource::Camera)
        } else {
            Ok(ImageSource::File(PathBuf::from(value)))
        }
    }
}

impl ImageSource {
    pub async fn acquire(
        &self,
        device: &CameraDevice,
        cancel: &CancellationToken,
    ) -> Result<ImageFile, AcquireError> {
        match self {
            ImageSource::File(path) => read_image_file(path).await,
            ImageSource::Camera => {
                let mut input = SlotInput::Upload;
                input.start_camera(device)?;
                input.capture(cancel).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_camera() -> CameraDevice {
        CameraDevice::new("sh", vec!["-c".to_string(), "sleep 30".to_string()], 1024)
    }

    fn one_frame_camera() -> CameraDevice {
        CameraDevice::new(
            "sh",
            vec![
                "-c".to_string(),
                r"printf '\377\330frame\377\331'; sleep 30".to_string(),
            ],
            1024,
        )
    }

    #[tokio::test]
    async fn switching_to_upload_releases_the_camera() {
        let device = idle_camera();
        let mut input = SlotInput::default();

        input.start_camera(&device).unwrap();
        assert!(input.is_camera());
        assert_eq!(device.active_tracks(), 1);

        input.switch_to_upload();
        assert!(!input.is_camera());
        assert_eq!(device.active_tracks(), 0);
    }

    #[tokio::test]
    async fn restarting_the_camera_keeps_a_single_track() {
        let device = idle_camera();
        let mut input = SlotInput::default();
        input.start_camera(&device).unwrap();
        input.start_camera(&device).unwrap();
        assert_eq!(device.active_tracks(), 1);
    }

    #[tokio::test]
    async fn capture_returns_to_upload_and_releases() {
        let device = one_frame_camera();
        let mut input = SlotInput::default();
        input.start_camera(&device).unwrap();

        let image = input.capture(&CancellationToken::new()).await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.name, "capture.jpg");
        assert!(!input.is_camera());
        assert_eq!(device.active_tracks(), 0);
    }

    #[tokio::test]
    async fn dropping_the_slot_releases_the_camera() {
        let device = idle_camera();
        {
            let mut input = SlotInput::default();
            input.start_camera(&device).unwrap();
            assert_eq!(device.active_tracks(), 1);
        }
        assert_eq!(device.active_tracks(), 0);
    }

    #[test]
    fn camera_keyword_selects_the_camera() {
        assert_eq!("Camera".parse::<ImageSource>().unwrap(), ImageSource::Camera);
        assert_eq!(
            "shots/me.jpg".parse::<ImageSource>().unwrap(),
            ImageSource::File(PathBuf::from("shots/me.jpg"))
        );
    }

    #[tokio::test]
    async fn camera_source_captures_and_releases() {
        let device = one_frame_camera();
        let image = ImageSource::Camera
            .acquire(&device, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(image.name, "capture.jpg");
        assert_eq!(device.active_tracks(), 0);
    }

    #[tokio::test]
    async fn capture_without_camera_is_an_access_error() {
        let mut input = SlotInput::Upload;
        let err = input.capture(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AcquireError::CameraAccess(_)));
        assert_eq!(err.user_message(Language::En), ui_text(Language::En).camera_error);
    }
}
