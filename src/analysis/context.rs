use serde::{Deserialize, Serialize};

const NOT_PROVIDED: &str = "Không cung cấp";
const NO_NOTES: &str = "Không có";

/// Patient metadata entered alongside the images. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalContext {
    pub gender: Option<String>,
    pub age: Option<String>,
    pub sample_location: Option<String>,
    pub clinical_diagnosis: Option<String>,
    pub additional_notes: Option<String>,
}

impl ClinicalContext {
    pub fn render(&self) -> String {
        format!(
            "- Giới tính: {}\n- Tuổi: {}\n- Vị trí lấy mẫu: {}\n- Chẩn đoán lâm sàng: {}\n- Ghi chú bổ sung: {}",
            field_or(self.gender.as_deref(), NOT_PROVIDED),
            field_or(self.age.as_deref(), NOT_PROVIDED),
            field_or(self.sample_location.as_deref(), NOT_PROVIDED),
            field_or(self.clinical_diagnosis.as_deref(), NOT_PROVIDED),
            field_or(self.additional_notes.as_deref(), NO_NOTES),
        )
    }
}

fn field_or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(fallback)
}
