pub const DISCLAIMER_LINE: &str = "**Lưu ý:** Phân tích này được tạo bởi AI và chỉ mang tính chất tham khảo, không thể thay thế cho chẩn đoán của bác sĩ chuyên khoa.";
pub const DIFFERENTIAL_HEADING: &str = "## Chẩn đoán phân biệt";

const EMPTY_CONTEXT_FALLBACK: &str = "Không có bối cảnh bổ sung.";

/// Fixed instruction sent after the images. Only the clinical context block
/// varies between requests.
pub fn build_instruction(clinical_context: &str) -> String {
    let context = match clinical_context.trim() {
        "" => EMPTY_CONTEXT_FALLBACK,
        value => value,
    };

    format!(
        "You are an expert histopathologist assistant AI. Your task is to analyze the provided histopathology images in conjunction with the clinical information provided by the user, and generate a concise report in VIETNAMESE.

**Clinical Context provided by user:**
{context}

If multiple images are provided, treat them as a series representing the same case. Correlate your findings from the images with the clinical context.

Your entire response MUST be in VIETNAMESE.

First, on a new line, write this mandatory disclaimer:
{DISCLAIMER_LINE}

Then, structure your analysis using markdown format exactly as follows:

{DIFFERENTIAL_HEADING}
List the 5 most likely differential diagnoses according to the latest WHO classification. Only provide the name of the diagnosis. Do not add any descriptions or explanations.

Your tone must be professional and objective. Do not provide a definitive diagnosis. The output should be strictly limited to the format above."
    )
}
