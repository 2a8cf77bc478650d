/**
 * AI Response Bridge
 *
 * Turns a student's message into a streamed AI answer published to the
 * room as a series of fragments.
 *
 * # Chunking
 *
 * Streamed text accumulates in a buffer. The buffer is flushed as one
 * fragment when it holds at least `threshold` characters, when its
 * right-trimmed text ends in `.`, `!` or `?`, or when it ends in a newline.
 * A whitespace-only buffer is carried into the next chunk instead of being
 * flushed. Whatever remains when the stream ends is flushed as the last
 * fragment, so the fragments concatenate to exactly the streamed text.
 *
 * # Failure
 *
 * If the generator fails before or during the stream, the unflushed buffer
 * is discarded and a single apology fragment is published instead.
 */

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use genai::chat::{ChatMessage as GenaiMessage, ChatRequest, ChatStreamEvent};

use crate::backend::chat::publisher::ChatPublisher;
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::store::MessageLog;
use crate::shared::chat::{ChatMessage, MessageBody, Room, UserType};

/// Fragment published when the AI cannot answer
pub const AI_APOLOGY: &str = "죄송합니다. 현재 AI 응답을 생성할 수 없습니다.";

/// Lazily produced text chunks of one completion
pub type TextStream = Pin<Box<dyn Stream<Item = BackendResult<String>> + Send>>;

/// Who spoke a prompt turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Student,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTurn {
    pub speaker: Speaker,
    pub content: String,
}

/// Input of one completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    /// Oldest first; the last turn is the student's question
    pub turns: Vec<PromptTurn>,
}

/// Source of streamed completions
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn stream_completion(&self, prompt: Prompt) -> BackendResult<TextStream>;
}

/// [`TextGenerator`] backed by the `genai` multi-provider client
pub struct GenaiTextGenerator {
    client: genai::Client,
    model: String,
}

impl GenaiTextGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: genai::Client::default(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for GenaiTextGenerator {
    async fn stream_completion(&self, prompt: Prompt) -> BackendResult<TextStream> {
        let mut messages = Vec::with_capacity(prompt.turns.len() + 1);
        messages.push(GenaiMessage::system(prompt.system));
        for turn in prompt.turns {
            messages.push(match turn.speaker {
                Speaker::Student => GenaiMessage::user(turn.content),
                Speaker::Assistant => GenaiMessage::assistant(turn.content),
            });
        }

        let response = self
            .client
            .exec_chat_stream(self.model.as_str(), ChatRequest::new(messages), None)
            .await
            .map_err(|e| BackendError::upstream_ai(e.to_string()))?;

        let chunks = response.stream.filter_map(|event| async move {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => Some(Ok(chunk.content)),
                Ok(_) => None,
                Err(e) => Some(Err(BackendError::upstream_ai(e.to_string()))),
            }
        });

        Ok(Box::pin(chunks))
    }
}

/// Buffer that splits streamed text into sentence-sized fragments
#[derive(Debug, Clone)]
pub struct Chunker {
    threshold: usize,
    buffer: String,
}

impl Chunker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            buffer: String::new(),
        }
    }

    /// Add a chunk; returns a fragment when the buffer is ready to flush
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buffer.push_str(chunk);
        if self.ready() {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Remaining text at end of stream
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }

    fn ready(&self) -> bool {
        let trimmed = self.buffer.trim_end();
        if trimmed.trim_start().is_empty() {
            return false;
        }
        self.buffer.chars().count() >= self.threshold
            || trimmed.ends_with(|c| matches!(c, '.' | '!' | '?'))
            || self.buffer.ends_with('\n')
    }
}

/// Generates and publishes AI answers for a room
pub struct AiBridge {
    generator: Arc<dyn TextGenerator>,
    messages: Arc<dyn MessageLog>,
    publisher: ChatPublisher,
    system_prompt: String,
    history_window: u32,
    chunk_threshold: usize,
}

impl AiBridge {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        messages: Arc<dyn MessageLog>,
        publisher: ChatPublisher,
        system_prompt: impl Into<String>,
        history_window: u32,
        chunk_threshold: usize,
    ) -> Self {
        Self {
            generator,
            messages,
            publisher,
            system_prompt: system_prompt.into(),
            history_window,
            chunk_threshold,
        }
    }

    /// Answer `trigger` in `room`; returns the number of fragments published
    ///
    /// Never fails: upstream errors become the apology fragment and publish
    /// errors are logged.
    pub async fn respond(&self, room: Room, trigger: ChatMessage) -> usize {
        let prompt = self.build_prompt(&room, &trigger).await;

        let mut stream = match self.generator.stream_completion(prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("[AI] Completion failed for room {}: {}", room.id, e);
                return self.publish_fragment(&room, AI_APOLOGY).await;
            }
        };

        let mut chunker = Chunker::new(self.chunk_threshold);
        let mut published = 0;

        while let Some(item) = stream.next().await {
            match item {
                Ok(text) => {
                    if let Some(fragment) = chunker.push(&text) {
                        published += self.publish_fragment(&room, &fragment).await;
                    }
                }
                Err(e) => {
                    tracing::error!("[AI] Stream failed mid-answer in room {}: {}", room.id, e);
                    return published + self.publish_fragment(&room, AI_APOLOGY).await;
                }
            }
        }

        if let Some(rest) = chunker.finish() {
            published += self.publish_fragment(&room, &rest).await;
        }

        tracing::debug!("[AI] Answered in room {} with {} fragments", room.id, published);
        published
    }

    async fn publish_fragment(&self, room: &Room, content: &str) -> usize {
        let fragment = ChatMessage::ai_fragment(room, content);
        match self.publisher.publish(&fragment).await {
            Ok(()) => 1,
            Err(e) => {
                tracing::warn!("[AI] Failed to publish fragment in room {}: {}", room.id, e);
                0
            }
        }
    }

    /// System prompt plus the recent student/AI turns of the room
    async fn build_prompt(&self, room: &Room, trigger: &ChatMessage) -> Prompt {
        let mut turns: Vec<PromptTurn> = Vec::new();

        if self.history_window > 0 {
            match self.messages.find_messages(room.id, 1, self.history_window).await {
                Ok(history) => {
                    for message in history.iter().rev() {
                        if message.id == trigger.id {
                            continue;
                        }
                        if let Some(turn) = prompt_turn(message) {
                            push_turn(&mut turns, turn);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("[AI] History unavailable for room {}: {}", room.id, e);
                }
            }
        }

        if let Some(turn) = prompt_turn(trigger) {
            push_turn(&mut turns, turn);
        }

        Prompt {
            system: self.system_prompt.clone(),
            turns,
        }
    }
}

fn prompt_turn(message: &ChatMessage) -> Option<PromptTurn> {
    let speaker = match message.user_type {
        UserType::Student => Speaker::Student,
        UserType::Ai => Speaker::Assistant,
        UserType::Teacher | UserType::System => return None,
    };
    let content = match &message.body {
        MessageBody::Text(text) => text.clone(),
        MessageBody::Image { url, filename } => match filename {
            Some(name) => format!("[image {name}] {url}"),
            None => format!("[image] {url}"),
        },
        MessageBody::System(_) => return None,
    };
    Some(PromptTurn { speaker, content })
}

/// Consecutive AI fragments form one assistant turn
fn push_turn(turns: &mut Vec<PromptTurn>, turn: PromptTurn) {
    if let Some(last) = turns.last_mut() {
        if last.speaker == Speaker::Assistant && turn.speaker == Speaker::Assistant {
            last.content.push_str(&turn.content);
            return;
        }
    }
    turns.push(turn);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(threshold: usize, chunks: &[&str]) -> Vec<String> {
        let mut chunker = Chunker::new(threshold);
        let mut out: Vec<String> = chunks.iter().filter_map(|c| chunker.push(c)).collect();
        out.extend(chunker.finish());
        out
    }

    #[test]
    fn test_flushes_on_sentence_end() {
        assert_eq!(
            run(50, &["Hel", "lo.", " How", " are", " you?"]),
            vec!["Hello.".to_string(), " How are you?".to_string()]
        );
    }

    #[test]
    fn test_flushes_on_trailing_whitespace_after_terminator() {
        assert_eq!(run(50, &["Done! ", "Next"]), vec!["Done! ".to_string(), "Next".to_string()]);
    }

    #[test]
    fn test_flushes_on_threshold() {
        let long = "a".repeat(60);
        assert_eq!(run(50, &[&long, "b"]), vec![long.clone(), "b".to_string()]);
    }

    #[test]
    fn test_flushes_on_newline() {
        assert_eq!(run(50, &["line one\n", "two"]), vec!["line one\n".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_whitespace_only_buffer_carries_over() {
        assert_eq!(run(50, &["\n", "Hi."]), vec!["\nHi.".to_string()]);
    }

    #[test]
    fn test_empty_stream_has_no_fragments() {
        assert!(run(50, &[]).is_empty());
    }

    #[test]
    fn test_threshold_counts_characters_not_bytes() {
        // 20 Hangul syllables are 60 bytes but only 20 characters
        let text = "가".repeat(20);
        assert_eq!(run(50, &[&text, "나"]), vec![format!("{text}나")]);
    }

    #[test]
    fn test_consecutive_ai_fragments_merge() {
        let mut turns = Vec::new();
        push_turn(&mut turns, PromptTurn { speaker: Speaker::Student, content: "q".into() });
        push_turn(&mut turns, PromptTurn { speaker: Speaker::Assistant, content: "a1 ".into() });
        push_turn(&mut turns, PromptTurn { speaker: Speaker::Assistant, content: "a2".into() });
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "a1 a2");
    }
}
