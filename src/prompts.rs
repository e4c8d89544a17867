use crate::types::{Language, Mode};

/// Delimiter the model is asked to put before every concept in Improve mode.
/// Not escaped: prose that happens to contain it will split a concept.
pub const CONCEPT_BREAK: &str = "||CONCEPT_BREAK||";

pub const RECREATE_PROMPT_EN: &str = "You are an expert visual posing coach. Your task is to analyze two images: the first is the 'Target Pose', and the second is the 'Model'. Your goal is to help the person in the 'Model' image replicate the 'Target Pose'.\nYour response MUST contain two parts:\n1.  **An edited version of the 'Model' image.** On this image, draw semi-transparent overlays, lines, and arrows to clearly guide the user's pose adjustments.\n2.  **A concise, step-by-step text guide** explaining the adjustments shown in the image. Focus on key changes in body angle, limbs, and head tilt.\nEnsure the text is encouraging and easy to follow. Respond in English.";

pub const RECREATE_PROMPT_VI: &str = "Bạn là một huấn luyện viên tạo dáng trực quan chuyên nghiệp. Nhiệm vụ của bạn là phân tích hai hình ảnh: hình đầu tiên là 'Dáng Mẫu', hình thứ hai là 'Người Mẫu'. Mục tiêu là giúp người trong ảnh 'Người Mẫu' sao chép lại 'Dáng Mẫu'.\nPhản hồi của bạn PHẢI chứa hai phần:\n1.  **Một phiên bản đã chỉnh sửa của ảnh 'Người Mẫu'.** Trên ảnh này, hãy vẽ các lớp phủ bán trong suốt, đường kẻ và mũi tên để hướng dẫn rõ ràng các điều chỉnh tư thế.\n2.  **Một hướng dẫn văn bản ngắn gọn, từng bước** giải thích các điều chỉnh được hiển thị trong hình ảnh. Tập trung vào những thay đổi chính về góc độ cơ thể, tay chân và độ nghiêng đầu.\nHãy đảm bảo phần văn bản mang tính khích lệ và dễ làm theo. Phản hồi bằng tiếng Việt.";

pub const IMPROVE_PROMPT_EN: &str = "You are a creative director for a photoshoot. Analyze the provided scene. Propose 3 distinct and creative concepts for a person to pose in this scene.\nFor each concept, provide a short, catchy title and a descriptive paragraph.\n**Structure your text response by starting each concept with the separator '||CONCEPT_BREAK||'**. The first line after the separator should be the title.\nAfter providing the text for all 3 concepts, **generate 3 corresponding high-quality illustrative images**, one for each concept, in the same order. Respond in English.";

pub const IMPROVE_PROMPT_VI: &str = "Bạn là một giám đốc sáng tạo cho một buổi chụp ảnh. Hãy phân tích khung cảnh được cung cấp. Đề xuất 3 concept sáng tạo và khác biệt để một người có thể tạo dáng trong khung cảnh này.\nĐối với mỗi concept, hãy cung cấp một tiêu đề ngắn, hấp dẫn và một đoạn mô tả.\n**Cấu trúc phản hồi văn bản của bạn bằng cách bắt đầu mỗi concept với dấu phân cách '||CONCEPT_BREAK||'**. Dòng đầu tiên sau dấu phân cách phải là tiêu đề.\nSau khi cung cấp văn bản cho cả 3 concept, **hãy tạo 3 hình ảnh minh họa chất lượng cao tương ứng**, mỗi hình một concept, theo đúng thứ tự. Phản hồi bằng tiếng Việt.";

pub fn build_prompt(mode: Mode, language: Language) -> &'static str {
    match (mode, language) {
        (Mode::Recreate, Language::En) => RECREATE_PROMPT_EN,
        (Mode::Recreate, Language::Vi) => RECREATE_PROMPT_VI,
        (Mode::Improve, Language::En) => IMPROVE_PROMPT_EN,
        (Mode::Improve, Language::Vi) => IMPROVE_PROMPT_VI,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improve_prompts_embed_the_concept_break() {
        for language in [Language::En, Language::Vi] {
            let prompt = build_prompt(Mode::Improve, language);
            assert!(prompt.contains(CONCEPT_BREAK), "missing separator for {language}");
            assert!(prompt.contains('3'));
        }
    }

    #[test]
    fn recreate_prompts_ask_for_an_image_and_a_guide() {
        let prompt = build_prompt(Mode::Recreate, Language::En);
        assert!(prompt.contains("edited version of the 'Model' image"));
        assert!(prompt.contains("step-by-step text guide"));
        assert!(!prompt.contains(CONCEPT_BREAK));
    }

    #[test]
    fn language_only_selects_the_string_set() {
        assert!(build_prompt(Mode::Recreate, Language::En).ends_with("Respond in English."));
        assert!(build_prompt(Mode::Recreate, Language::Vi).ends_with("Phản hồi bằng tiếng Việt."));
        assert_ne!(
            build_prompt(Mode::Improve, Language::En),
            build_prompt(Mode::Improve, Language::Vi)
        );
    }
}
