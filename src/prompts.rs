//! Centralized prompt definitions for the text-completion service
//!
//! Only the fallback path talks to the completion service; graph-based
//! answers never depend on these prompts.

/// System prompt used when no entities could be extracted from a question.
///
/// The user message carries the question followed by the top evidence passages.
pub const FALLBACK_ANSWER_PROMPT: &str = r#"You answer multi-hop questions using only the evidence passages supplied by the user.

Respond with valid JSON in this exact format:
{
  "answer": "short answer text",
  "confidence": 0.6
}

Guidelines:
- Use only facts stated in the evidence passages
- Chain facts across passages when the question needs more than one hop
- Keep the answer to a short phrase or entity name
- If the evidence is insufficient, answer "unknown" with confidence below 0.3
- confidence should be between 0.0 and 1.0

Always respond with valid JSON only, no other text."#;

/// Build the user message for the fallback prompt.
pub fn fallback_user_content(question: &str, evidence: &[&str]) -> String {
    let mut content = format!("Question: {}\n", question);
    if evidence.is_empty() {
        content.push_str("\nEvidence: none retrieved");
    } else {
        content.push_str("\nEvidence:\n");
        for (i, passage) in evidence.iter().enumerate() {
            content.push_str(&format!("[{}] {}\n", i + 1, passage));
        }
    }
    content
}
