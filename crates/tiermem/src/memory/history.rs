//! Conversation transcript formatting

use crate::memory::types::Record;

pub const USER_KEY: &str = "user";
pub const AI_KEY: &str = "ai";
pub const AGENT_TYPE_KEY: &str = "agent_type";

pub fn interaction_text(user: &str, ai: &str) -> String {
    format!("User: {user}\nAI: {ai}")
}

/// One `User: ..\nAI: ..` block per interaction, blank-line separated.
/// Records without user/ai metadata contribute their text verbatim.
pub fn format_history(records: &[Record]) -> String {
    let mut out = String::new();
    for record in records {
        match (record.metadata.get(USER_KEY), record.metadata.get(AI_KEY)) {
            (Some(user), Some(ai)) => out.push_str(&interaction_text(user, ai)),
            _ => out.push_str(&record.text),
        }
        out.push_str("\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::RecordKind;
    use chrono::Utc;

    #[test]
    fn test_format_history() {
        let mut exchange = Record::new(
            interaction_text("Hello, how are you?", "Doing well, thanks!"),
            vec![],
            RecordKind::Interaction,
            Utc::now(),
        );
        exchange
            .metadata
            .insert(USER_KEY.into(), "Hello, how are you?".into());
        exchange
            .metadata
            .insert(AI_KEY.into(), "Doing well, thanks!".into());
        let note = Record::new("a plain note".into(), vec![], RecordKind::DocumentChunk, Utc::now());

        let text = format_history(&[exchange, note]);
        assert_eq!(
            text,
            "User: Hello, how are you?\nAI: Doing well, thanks!\n\na plain note\n\n"
        );
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(format_history(&[]), "");
    }
}
