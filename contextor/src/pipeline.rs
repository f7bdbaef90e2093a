//! Retrieve-then-generate pipeline.
//!
//! `Start → Retrieving → Generating → Done`, always in that order. An empty
//! retrieval is passed on to generation unchanged.

use std::fmt;
use std::sync::Arc;

use rag_store::{Chunk, Document, VectorIndex};
use tracing::{debug, info, instrument};

use crate::api_types::{AgentState, StreamingAnswer};
use crate::error::ContextorError;
use crate::llm::Generator;
use crate::prompt;

/// Source label of the ad-hoc chunk built from an uploaded file.
pub const UPLOAD_SOURCE: &str = "upload";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    Retrieving,
    Generating,
    Done,
}

impl PipelineStage {
    /// The following stage; `Done` is terminal.
    pub fn next(self) -> Self {
        match self {
            Self::Start => Self::Retrieving,
            Self::Retrieving => Self::Generating,
            Self::Generating | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Retrieving => "retrieving",
            Self::Generating => "generating",
            Self::Done => "done",
        })
    }
}

/// Tracks one invocation's stage.
struct Run {
    stage: PipelineStage,
}

impl Run {
    fn start() -> Self {
        Self {
            stage: PipelineStage::Start,
        }
    }

    fn advance(&mut self) -> PipelineStage {
        let next = self.stage.next();
        debug!(from = %self.stage, to = %next, "pipeline stage");
        self.stage = next;
        next
    }
}

/// Question prefix used when the caller attaches a file to a chat request.
pub fn with_uploaded_context(question: &str, file: &str) -> String {
    format!("Context from uploaded file:\n{file}\n\nUser Question: {question}")
}

#[derive(Clone)]
pub struct RagPipeline {
    index: VectorIndex,
    generator: Arc<dyn Generator>,
}

impl RagPipeline {
    pub fn new(index: VectorIndex, generator: Arc<dyn Generator>) -> Self {
        Self { index, generator }
    }

    /// Top-k chunks for `question`, in descending similarity.
    #[instrument(skip_all, fields(top_k = self.index.top_k()))]
    pub async fn retrieve(&self, question: &str) -> Result<AgentState, ContextorError> {
        let hits = self.index.retrieve(question).await?;
        debug!(hits = hits.len(), "retrieved context");
        let mut state = AgentState::new(question);
        state.documents = hits.into_iter().map(|h| h.chunk).collect();
        Ok(state)
    }

    /// Fills `generation` from the rendered prompt.
    pub async fn generate(&self, mut state: AgentState) -> Result<AgentState, ContextorError> {
        let prompt = prompt::render(&state.question, &state.documents);
        state.generation = self.generator.generate(&prompt).await?;
        Ok(state)
    }

    /// Runs retrieval and generation to completion.
    ///
    /// # Errors
    /// Embedding, search or generation failures; nothing is retried.
    pub async fn run(&self, question: &str) -> Result<AgentState, ContextorError> {
        let mut run = Run::start();
        run.advance();
        let state = self.retrieve(question).await?;
        run.advance();
        let state = self.generate(state).await?;
        run.advance();
        info!(
            documents = state.documents.len(),
            answer_len = state.generation.len(),
            "pipeline finished"
        );
        Ok(state)
    }

    /// Like [`run`](Self::run) but hands back the model output as a stream.
    ///
    /// With `file`, the question is prefixed by the file content before
    /// retrieval and the file is added as one extra `source=upload` chunk.
    /// That chunk only lives in the returned answer; the index is not touched.
    ///
    /// # Errors
    /// Failures up to and including opening the model stream. Later failures
    /// arrive as an `Err` fragment.
    pub async fn stream(
        &self,
        question: &str,
        file: Option<&str>,
    ) -> Result<StreamingAnswer, ContextorError> {
        let mut run = Run::start();
        let question = match file {
            Some(content) => with_uploaded_context(question, content),
            None => question.to_string(),
        };

        run.advance();
        let mut state = self.retrieve(&question).await?;
        if let Some(content) = file {
            state
                .documents
                .push(Chunk::whole(Document::new(content, UPLOAD_SOURCE)));
        }

        run.advance();
        let prompt = prompt::render(&state.question, &state.documents);
        let fragments = self.generator.generate_stream(&prompt).await?;
        // Done from the pipeline's view; the consumer drains the stream.
        run.advance();
        info!(documents = state.documents.len(), upload = file.is_some(), "streaming answer");

        Ok(StreamingAnswer {
            question: state.question,
            documents: state.documents,
            fragments,
        })
    }
}
