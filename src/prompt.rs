//! Prompt synthesis.

/// Style description every rendering starts from.
pub const BASE_PROMPT: &str = "Photorealistic, premium aluminium bioclimatic pergola installed on the scene. \
Ultra-realistic materials, architectural accuracy, correct perspective, realistic sun shadows, 8K look.";

/// Builds the prompt sent to the model.
///
/// The colour and note are appended verbatim after trimming; blank values
/// are dropped.
pub fn build_prompt(base: &str, color: Option<&str>, note: Option<&str>) -> String {
    let mut prompt = base.trim().to_string();

    if let Some(color) = non_blank(color) {
        prompt.push_str(" Colour: ");
        prompt.push_str(color);
        prompt.push('.');
    }

    if let Some(note) = non_blank(note) {
        prompt.push(' ');
        prompt.push_str(note);
    }

    prompt
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
