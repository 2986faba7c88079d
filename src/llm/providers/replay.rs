//! Replay provider: answers from a queue of canned replies.
//!
//! Each call pops the next reply; once the queue runs dry the last reply is
//! repeated. Every prompt received is recorded so callers can inspect what
//! the personas actually sent.
//!
//! [`ReplayProvider::echo`] backs the `dummy` provider: with no queue it
//! answers `[echo] <prompt>`, so the pipeline runs offline without a key.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::ProviderError;

#[derive(Debug, Default)]
struct ReplayState {
    replies: VecDeque<String>,
    last: Option<String>,
    prompts: Vec<String>,
    echo: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayProvider {
    state: Arc<Mutex<ReplayState>>,
}

impl ReplayProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = ReplayState {
            replies: replies.into_iter().map(Into::into).collect(),
            ..ReplayState::default()
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Provider that echoes every prompt back.
    pub fn echo() -> Self {
        let state = ReplayState { echo: true, ..ReplayState::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ProviderError::Request("replay state poisoned".into()))?;
        state.prompts.push(prompt.to_string());
        if let Some(next) = state.replies.pop_front() {
            state.last = Some(next.clone());
            return Ok(next);
        }
        if state.echo {
            return Ok(format!("[echo] {prompt}"));
        }
        state
            .last
            .clone()
            .ok_or_else(|| ProviderError::Request("replay queue is empty".into()))
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.state.lock().map(|s| s.prompts.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().map(|s| s.prompts.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_in_order_then_repeats_last() {
        let p = ReplayProvider::new(["one", "two"]);
        assert_eq!(p.complete("a").await.unwrap(), "one");
        assert_eq!(p.complete("b").await.unwrap(), "two");
        assert_eq!(p.complete("c").await.unwrap(), "two");
        assert_eq!(p.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_queue_errors() {
        let p = ReplayProvider::new(Vec::<String>::new());
        assert!(p.complete("x").await.is_err());
        assert_eq!(p.calls(), 1);
    }

    #[tokio::test]
    async fn echo_mode_returns_prompt() {
        let p = ReplayProvider::echo();
        assert_eq!(p.complete("hello").await.unwrap(), "[echo] hello");
        assert_eq!(p.complete("").await.unwrap(), "[echo] ");
        assert_eq!(p.calls(), 2);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let p = ReplayProvider::new(["only"]);
        let q = p.clone();
        q.complete("from clone").await.unwrap();
        assert_eq!(p.calls(), 1);
    }
}
