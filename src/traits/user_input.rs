use anyhow::Result;
#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::Mutex;

/// Trait for user input operations to enable testing with mocks
pub trait UserInput: Send + Sync {
    /// Display a selection prompt; returns the index of the chosen option
    fn select(&self, prompt: &str, options: Vec<String>) -> Result<usize>;

    /// Display a text input prompt
    ///
    /// Returns `None` when the user cancels the prompt with Escape.
    fn text(&self, prompt: &str, default: Option<&str>, help: Option<&str>)
    -> Result<Option<String>>;
}

/// Real user input implementation using inquire crate
pub struct InquireUserInput;

impl UserInput for InquireUserInput {
    fn select(&self, prompt: &str, options: Vec<String>) -> Result<usize> {
        use inquire::Select;
        let answer = Select::new(prompt, options)
            .with_page_size(15)
            .raw_prompt()?;
        Ok(answer.index)
    }

    fn text(
        &self,
        prompt: &str,
        default: Option<&str>,
        help: Option<&str>,
    ) -> Result<Option<String>> {
        use inquire::Text;
        let mut text_prompt = Text::new(prompt);
        if let Some(default_val) = default {
            text_prompt = text_prompt.with_initial_value(default_val);
        }
        if let Some(help) = help {
            text_prompt = text_prompt.with_help_message(help);
        }
        let answer = text_prompt.prompt_skippable()?;
        Ok(answer)
    }
}

/// Response type for mock user input
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Pick the option whose text starts with this prefix
    Select(String),
    Text(String),
    /// Cancel a text prompt
    Cancel,
}

/// Mock user input implementation for testing
#[cfg(test)]
pub struct MockUserInput {
    responses: Mutex<VecDeque<MockResponse>>,
}

#[cfg(test)]
impl MockUserInput {
    /// Create new mock with no pre-configured responses
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    /// Create mock with pre-configured responses
    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    fn next_response(&self) -> Result<MockResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("No more mock responses available"))
    }
}

#[cfg(test)]
impl Default for MockUserInput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl UserInput for MockUserInput {
    fn select(&self, _prompt: &str, options: Vec<String>) -> Result<usize> {
        match self.next_response()? {
            MockResponse::Select(answer) => options
                .iter()
                .position(|o| o.starts_with(&answer))
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Mock response '{}' is not in the provided options: {:?}",
                        answer,
                        options
                    )
                }),
            other => anyhow::bail!("Expected Select response but got {:?}", other),
        }
    }

    fn text(
        &self,
        _prompt: &str,
        _default: Option<&str>,
        _help: Option<&str>,
    ) -> Result<Option<String>> {
        match self.next_response()? {
            MockResponse::Text(answer) => Ok(Some(answer)),
            MockResponse::Cancel => Ok(None),
            other => anyhow::bail!("Expected Text response but got {:?}", other),
        }
    }
}
