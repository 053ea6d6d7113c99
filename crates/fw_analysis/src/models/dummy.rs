use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use fw_core::{Error, Result, TextGenerator};

/// Replays canned responses; the last one repeats. Used for offline runs
/// and tests.
pub struct DummyModel {
    name: String,
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl DummyModel {
    pub fn new(name: &str, responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(responses.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(name: &str, response: &str) -> Self {
        Self::new(name, vec![Ok(response.to_string())])
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::new(name, vec![Err(message.to_string())])
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for DummyModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| Error::Inference("dummy model state poisoned".to_string()))?;
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(Error::Inference(message)),
            None => Err(Error::Inference(format!("{} has no responses", self.name))),
        }
    }
}
