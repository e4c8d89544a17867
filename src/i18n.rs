use crate::types::{ImageSlot, Language, Mode};

/// Every user-facing string, one set per language.
#[derive(Debug)]
pub struct UiText {
    pub title: &'static str,
    pub recreate_mode: &'static str,
    pub recreate_description: &'static str,
    pub improve_mode: &'static str,
    pub improve_description: &'static str,
    pub select_mode: &'static str,
    pub target_image: &'static str,
    pub scene_image: &'static str,
    pub your_image: &'static str,
    pub upload_instruction: &'static str,
    pub change_image: &'static str,
    pub upload: &'static str,
    pub camera: &'static str,
    pub capture: &'static str,
    pub camera_error: &'static str,
    pub camera_live: &'static str,
    pub file_error: &'static str,
    pub generate: &'static str,
    pub generating: &'static str,
    pub generate_disabled: &'static str,
    pub error_title: &'static str,
    pub error_instruction: &'static str,
    pub cancelled: &'static str,
    pub ai_response_title: &'static str,
    pub concepts_title: &'static str,
    pub saved_to: &'static str,
    pub empty_slot: &'static str,
}

pub const EN: UiText = UiText {
    title: "AI Posing Assistant",
    recreate_mode: "Recreate a Pose",
    recreate_description: "Upload a target pose and your photo to get step-by-step guidance.",
    improve_mode: "Get Pose Ideas",
    improve_description: "Upload a scene and get creative concepts for posing in it.",
    select_mode: "Select a mode to get started.",
    target_image: "Target Pose",
    scene_image: "Scene",
    your_image: "Your Image",
    upload_instruction: "Give the path of an image file, or switch to the camera.",
    change_image: "Change image",
    upload: "Upload",
    camera: "Camera",
    capture: "Capture",
    camera_error: "Could not access the camera. Please check permissions or use upload instead.",
    camera_live: "Camera is live. Type 'capture' to take the photo or 'close' to stop.",
    file_error: "Could not read that image file.",
    generate: "Generate",
    generating: "Generating...",
    generate_disabled: "Add the required images first (or wait for the current request).",
    error_title: "Error",
    error_instruction: "Sorry, something went wrong while generating your result. The request may have been blocked by safety policies. Please try different images.",
    cancelled: "Request cancelled.",
    ai_response_title: "AI Posing Guide",
    concepts_title: "Creative Concepts",
    saved_to: "Saved",
    empty_slot: "(empty)",
};

pub const VI: UiText = UiText {
    title: "Trợ Lý Tạo Dáng AI",
    recreate_mode: "Tạo Lại Dáng",
    recreate_description: "Tải lên dáng mẫu và ảnh của bạn để nhận hướng dẫn từng bước.",
    improve_mode: "Gợi Ý Tạo Dáng",
    improve_description: "Tải lên khung cảnh để nhận các concept tạo dáng sáng tạo.",
    select_mode: "Chọn một chế độ để bắt đầu.",
    target_image: "Dáng Mẫu",
    scene_image: "Khung Cảnh",
    your_image: "Ảnh Của Bạn",
    upload_instruction: "Nhập đường dẫn tệp ảnh, hoặc chuyển sang máy ảnh.",
    change_image: "Đổi ảnh",
    upload: "Tải lên",
    camera: "Máy ảnh",
    capture: "Chụp",
    camera_error: "Không thể truy cập máy ảnh. Vui lòng kiểm tra quyền hoặc dùng chức năng tải lên.",
    camera_live: "Máy ảnh đang bật. Gõ 'capture' để chụp hoặc 'close' để tắt.",
    file_error: "Không thể đọc tệp ảnh này.",
    generate: "Tạo",
    generating: "Đang tạo...",
    generate_disabled: "Hãy thêm đủ ảnh cần thiết (hoặc chờ yêu cầu hiện tại).",
    error_title: "Lỗi",
    error_instruction: "Xin lỗi, đã có lỗi khi tạo kết quả. Yêu cầu có thể đã bị chặn bởi chính sách an toàn. Vui lòng thử ảnh khác.",
    cancelled: "Đã hủy yêu cầu.",
    ai_response_title: "Hướng Dẫn Tạo Dáng AI",
    concepts_title: "Concept Sáng Tạo",
    saved_to: "Đã lưu",
    empty_slot: "(trống)",
};

pub fn ui_text(language: Language) -> &'static UiText {
    match language {
        Language::En => &EN,
        Language::Vi => &VI,
    }
}

impl UiText {
    pub fn mode_name(&self, mode: Mode) -> &'static str {
        match mode {
            Mode::Recreate => self.recreate_mode,
            Mode::Improve => self.improve_mode,
        }
    }

    pub fn slot_label(&self, mode: Mode, slot: ImageSlot) -> &'static str {
        match (mode, slot) {
            (Mode::Recreate, ImageSlot::Target) => self.target_image,
            (Mode::Improve, ImageSlot::Target) => self.scene_image,
            (_, ImageSlot::Model) => self.your_image,
        }
    }
}
