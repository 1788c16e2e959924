//! Chat pipeline
//!
//! Embeds the user's message, retrieves the closest passages and either
//! returns the best passage as is or, when a language model is configured,
//! answers from the passages and cites the answer in the top passage.

use densex_core::{generate_citation, Span};
use densex_llm::{Embedder, OpenRouterClient};
use densex_search::{Match, VectorStore};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Reply when the index has nothing for the message
pub const NO_RESULTS: &str = "No results found.";

/// Chat failures
#[derive(Debug, Error)]
pub enum ChatError {
    /// Blank or whitespace-only message
    #[error("message must be non-empty")]
    EmptyMessage,

    /// Embedding or generation failed
    #[error(transparent)]
    Model(#[from] densex_llm::Error),

    /// Index query failed
    #[error(transparent)]
    Search(#[from] densex_search::Error),
}

impl ChatError {
    /// The usage ledger refused further spending
    pub fn is_budget_exceeded(&self) -> bool {
        match self {
            ChatError::Model(e) => e.is_budget_exceeded(),
            ChatError::Search(e) => e.is_budget_exceeded(),
            ChatError::EmptyMessage => false,
        }
    }

    /// Caused by the request rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyMessage
                | ChatError::Model(densex_llm::Error::InvalidInput(_))
                | ChatError::Search(densex_search::Error::InvalidInput(_))
        )
    }
}

/// Answer to one chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    /// Generated answer, or the best passage when no model is configured
    pub reply: String,
    /// Passage the answer was drawn from, when it differs from the reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Location of the answer inside `context`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<Span>,
}

impl ChatReply {
    fn plain(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            context: None,
            citation: None,
        }
    }
}

/// Retrieval (and optional generation) over the vector index
pub struct ChatPipeline {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    llm: Option<OpenRouterClient>,
    top_k: usize,
}

impl std::fmt::Debug for ChatPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatPipeline")
            .field("embedder", &self.embedder)
            .field("store", &self.store.name())
            .field("llm", &self.llm.is_some())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl ChatPipeline {
    /// Retrieval-only pipeline returning the best passage
    pub fn new(embedder: Embedder, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            llm: None,
            top_k: top_k.max(1),
        }
    }

    /// Answer from the retrieved passages with `llm`
    pub fn with_llm(mut self, llm: OpenRouterClient) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Whether replies are generated by a language model
    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Answer `message` from the index
    #[instrument(skip(self, message), fields(chars = message.chars().count()))]
    pub async fn handle_message(&self, message: &str) -> Result<ChatReply, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let vector = self.embedder.embed_one(message).await?;
        let matches = self.store.query(&vector, self.top_k).await?;
        let passages = passages(&matches);
        debug!(matches = matches.len(), passages = passages.len(), "retrieved");

        let Some(top) = passages.first() else {
            info!("no passages for message");
            return Ok(ChatReply::plain(NO_RESULTS));
        };

        let Some(llm) = &self.llm else {
            return Ok(ChatReply::plain(*top));
        };

        let completion = llm.complete(&build_prompt(message, &passages)).await?;
        let answer = completion.text.trim().to_string();
        let citation = generate_citation(top, &answer).ok();

        Ok(ChatReply {
            reply: answer,
            context: Some(top.to_string()),
            citation,
        })
    }
}

/// Passage texts in score order; matches without text are skipped
fn passages(matches: &[Match]) -> Vec<&str> {
    matches
        .iter()
        .filter_map(Match::text)
        .filter(|t| !t.trim().is_empty())
        .collect()
}

fn build_prompt(question: &str, passages: &[&str]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the passages below. \
         Quote the passage wording where possible. \
         If the passages do not contain the answer, say so.\n\n",
    );
    for (i, passage) in passages.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n\n", i + 1, passage));
    }
    prompt.push_str(&format!("Question: {}\nAnswer:", question.trim()));
    prompt
}
