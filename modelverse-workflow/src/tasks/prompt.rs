use modelverse_core::{ChatMessage, Sample};

const INSTRUCTION: &str =
    "Choose the single best answer from the options above. Reply with the option letter only.";

/// Render a multiple-choice question. The output depends only on the
/// sample and the letters, so repeated runs send identical prompts.
pub fn build_prompt(sample: &Sample, letters: &[char]) -> String {
    let mut prompt = format!("Question: {}\n\n", sample.question.trim());
    for (letter, choice) in letters.iter().zip(&sample.choices) {
        prompt.push_str(&format!("{letter}. {}\n", choice.trim()));
    }
    prompt.push('\n');
    prompt.push_str(INSTRUCTION);
    prompt
}

pub fn prompt_messages(sample: &Sample, letters: &[char]) -> Vec<ChatMessage> {
    vec![ChatMessage::user(build_prompt(sample, letters))]
}
