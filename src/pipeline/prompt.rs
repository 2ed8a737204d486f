//! Prompt builder.

use super::types::{ExtractedEmail, PromptedEmail};

/// Template first, then one newline, then the email text. No escaping.
pub fn build_prompt(template: &str, text: &str) -> String {
    format!("{template}\n{text}")
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn build(&self, text: &str) -> String {
        build_prompt(&self.template, text)
    }

    pub fn add_prompt(&self, record: ExtractedEmail) -> PromptedEmail {
        let prompt = self.build(record.text());
        record.with_prompt(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_then_single_newline() {
        let builder = PromptBuilder::new("Draft a short reply. Answer NO REPLY NEEDED if none.");
        assert_eq!(
            builder.build("FROM: a\nTO: b"),
            "Draft a short reply. Answer NO REPLY NEEDED if none.\nFROM: a\nTO: b"
        );
    }

    #[test]
    fn text_is_not_escaped() {
        assert_eq!(build_prompt("T", "<b>{x}</b>\n"), "T\n<b>{x}</b>\n");
    }
}
