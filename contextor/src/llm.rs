//! Generation seam used by the pipeline.

use std::{future::Future, pin::Pin};

use ai_llm_service::{AiLlmError, LlmServiceProfiles, TokenStream};

pub type GenFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AiLlmError>> + Send + 'a>>;

/// A language model that answers a fully rendered prompt.
///
/// Both calls must see the same model and settings so that a drained stream
/// matches the one-shot answer.
pub trait Generator: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> GenFuture<'a, String>;

    fn generate_stream<'a>(&'a self, prompt: &'a str) -> GenFuture<'a, TokenStream>;
}

/// The configured generation profile. The prompt carries every instruction,
/// so no system message is sent.
impl Generator for LlmServiceProfiles {
    fn generate<'a>(&'a self, prompt: &'a str) -> GenFuture<'a, String> {
        Box::pin(LlmServiceProfiles::generate(self, prompt, None))
    }

    fn generate_stream<'a>(&'a self, prompt: &'a str) -> GenFuture<'a, TokenStream> {
        Box::pin(LlmServiceProfiles::generate_stream(self, prompt, None))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic model: answers with the number of context blocks and the
    /// last question line, streamed in small pieces.
    #[derive(Default)]
    pub(crate) struct ScriptedGenerator {
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn answer(&self, prompt: &str) -> String {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let blocks = prompt.lines().filter(|l| l.starts_with('[')).count();
            let question = prompt
                .lines()
                .skip_while(|l| !l.starts_with("Question:"))
                .nth(1)
                .unwrap_or("");
            format!("Saw {blocks} context blocks for: {question}")
        }

        pub(crate) fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    impl Generator for ScriptedGenerator {
        fn generate<'a>(&'a self, prompt: &'a str) -> GenFuture<'a, String> {
            Box::pin(async move { Ok(self.answer(prompt)) })
        }

        fn generate_stream<'a>(&'a self, prompt: &'a str) -> GenFuture<'a, TokenStream> {
            Box::pin(async move {
                let chars: Vec<char> = self.answer(prompt).chars().collect();
                let pieces = chars.chunks(5).map(|c| c.iter().collect::<String>());
                Ok(TokenStream::from_fragments(pieces))
            })
        }
    }
}
