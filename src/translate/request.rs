use std::fmt;

/// One translation job, built fresh per run
#[derive(Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    api_key: String,
    model: String,
    prompt: String,
    selection: String,
}

impl TranslationRequest {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
        selection: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            prompt: prompt.into(),
            selection: selection.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Text sent to the model: the instructions, a blank line, then the selection
    pub fn compose(&self) -> String {
        format!("{}\n\n{}", self.prompt, self.selection)
    }
}

impl fmt::Debug for TranslationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationRequest")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("prompt_chars", &self.prompt.chars().count())
            .field("selection_chars", &self.selection.chars().count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose() {
        let request = TranslationRequest::new("key", "gemini-2.5-flash", "Translate:", "bonjour");
        assert_eq!(request.compose(), "Translate:\n\nbonjour");
        assert_eq!(request.model(), "gemini-2.5-flash");
        assert_eq!(request.api_key(), "key");
    }

    #[test]
    fn test_debug_hides_key() {
        let request = TranslationRequest::new("secret-key", "m", "p", "s");
        assert!(!format!("{:?}", request).contains("secret-key"));
    }
}
