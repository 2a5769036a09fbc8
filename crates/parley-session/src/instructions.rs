//! Session instruction composition.
//!
//! The readiness update carries one instruction string concatenated from
//! the configured sources in a fixed order: persona, long-term memory
//! context, recent-conversation summaries, language directive. Empty
//! sections are skipped, not padded.

/// The text sources the session update is composed from.
#[derive(Debug, Clone, Default)]
pub struct InstructionSources {
    /// Persona / system instructions.
    pub persona: String,
    /// Long-term memory context.
    pub memory_context: String,
    /// Summaries of recent conversations.
    pub recent_summaries: String,
    /// Conversation language (e.g. "en", "pt").
    pub language: String,
}

/// Composes the session instruction string.
pub fn compose(sources: &InstructionSources) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(4);
    if !sources.persona.trim().is_empty() {
        sections.push(sources.persona.trim().to_string());
    }
    if !sources.memory_context.trim().is_empty() {
        sections.push(format!(
            "What you remember about this user:\n{}",
            sources.memory_context.trim()
        ));
    }
    if !sources.recent_summaries.trim().is_empty() {
        sections.push(format!(
            "Recent conversations:\n{}",
            sources.recent_summaries.trim()
        ));
    }
    if !sources.language.trim().is_empty() {
        sections.push(format!(
            "Always speak in the language '{}' unless the user asks otherwise.",
            sources.language.trim()
        ));
    }
    sections.join("\n\n")
}

/// Override instructions for the optional greeting response. Re-states the
/// persona so the very first spoken response is delivered in character
/// rather than with the service defaults.
pub fn greeting_instructions(sources: &InstructionSources) -> String {
    let persona = sources.persona.trim();
    if persona.is_empty() {
        "Greet the user briefly and ask how you can help.".to_string()
    } else {
        format!("{persona}\n\nGreet the user briefly, in character, and ask how you can help.")
    }
}
