//! A provider that replays canned answers, for tests and offline runs.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::provider::{LlmError, LlmProvider, TokenStream};

pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    tokens: Option<Vec<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Answers successive `complete` calls with `replies`, in order.
    pub fn new(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            tokens: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Streams `tokens` as separate deltas on every `stream` call.
    pub fn streaming(tokens: Vec<&str>) -> Arc<Self> {
        Self::streaming_results(tokens.into_iter().map(Ok).collect())
    }

    /// Like [`ScriptedProvider::streaming`], with `Err` items surfacing as
    /// protocol errors in the token stream.
    pub fn streaming_results(items: Vec<Result<&str, &str>>) -> Arc<Self> {
        let tokens = items
            .into_iter()
            .map(|item| item.map(str::to_string).map_err(str::to_string))
            .collect();

        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            tokens: Some(tokens),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.to_string());
        self.replies.lock().pop_front().ok_or(LlmError::EmptyCompletion)
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        match &self.tokens {
            Some(tokens) => {
                self.prompts.lock().push(prompt.to_string());
                let items = tokens.clone().into_iter().map(|item| item.map_err(LlmError::Protocol));
                Ok(stream::iter(items).boxed())
            }
            None => {
                let text = self.complete(prompt).await?;
                Ok(stream::once(async move { Ok(text) }).boxed())
            }
        }
    }
}
