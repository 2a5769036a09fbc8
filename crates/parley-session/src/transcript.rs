//! Transcript recording.
//!
//! User turns append when a finalized input transcription arrives with
//! non-empty text. Assistant turns accumulate streamed deltas and flush as
//! one turn when the transcript-done or response-done event arrives. Every
//! store interaction is best-effort: a persistence failure is logged and
//! absorbed, never surfaced, never blocking the protocol.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use parley_types::{ConversationTurn, TranscriptStore, TurnRole};

pub struct TranscriptRecorder {
    store: Arc<dyn TranscriptStore>,
    record_id: Mutex<Option<String>>,
    assistant_buf: StdMutex<String>,
}

impl TranscriptRecorder {
    pub fn new(store: Arc<dyn TranscriptStore>) -> Self {
        Self {
            store,
            record_id: Mutex::new(None),
            assistant_buf: StdMutex::new(String::new()),
        }
    }

    /// Creates the conversation record if it does not exist yet. Called at
    /// session start; also retried lazily on first append if that failed.
    pub async fn ensure_record(&self) {
        let mut record_id = self.record_id.lock().await;
        if record_id.is_some() {
            return;
        }
        match self.store.create_record().await {
            Ok(id) => {
                debug!(record = %id, "conversation record created");
                *record_id = Some(id);
            }
            Err(e) => warn!(error = %e, "failed to create conversation record"),
        }
    }

    /// Appends a finalized user turn. Empty text is ignored.
    pub async fn record_user(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.append(ConversationTurn::new(TurnRole::User, text)).await;
    }

    /// Accumulates one streamed assistant transcript fragment.
    pub fn push_assistant_delta(&self, delta: &str) {
        match self.assistant_buf.lock() {
            Ok(mut buf) => buf.push_str(delta),
            Err(_) => warn!("assistant transcript buffer lock poisoned"),
        }
    }

    /// Flushes the accumulated assistant transcript as one turn and clears
    /// the buffer. When the buffer is empty, `fallback` (the event's own
    /// transcript field, when present) is used instead.
    pub async fn flush_assistant(&self, fallback: Option<&str>) {
        let text = match self.assistant_buf.lock() {
            Ok(mut buf) => {
                if buf.is_empty() {
                    fallback.unwrap_or("").to_string()
                } else {
                    std::mem::take(&mut *buf)
                }
            }
            Err(_) => {
                warn!("assistant transcript buffer lock poisoned");
                return;
            }
        };

        if text.trim().is_empty() {
            return;
        }
        self.append(ConversationTurn::new(TurnRole::Assistant, text))
            .await;
    }

    async fn append(&self, turn: ConversationTurn) {
        self.ensure_record().await;
        let record_id = match self.record_id.lock().await.clone() {
            Some(id) => id,
            None => {
                warn!("dropping transcript turn: no conversation record");
                return;
            }
        };
        if let Err(e) = self.store.append_turn(&record_id, turn).await {
            warn!(error = %e, record = %record_id, "failed to persist transcript turn");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_types::StoreError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        turns: Mutex<Vec<ConversationTurn>>,
        fail_creates: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl TranscriptStore for RecordingStore {
        async fn create_record(&self) -> Result<String, StoreError> {
            if self.fail_creates.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Service("down".to_string()));
            }
            Ok("rec_1".to_string())
        }

        async fn append_turn(
            &self,
            record_id: &str,
            turn: ConversationTurn,
        ) -> Result<(), StoreError> {
            assert_eq!(record_id, "rec_1");
            self.turns.lock().unwrap().push(turn);
            Ok(())
        }
    }

    #[tokio::test]
    async fn user_turns_skip_empty_text() {
        let store = Arc::new(RecordingStore::default());
        let recorder = TranscriptRecorder::new(store.clone());

        recorder.record_user("  ").await;
        recorder.record_user("hello there").await;

        let turns = store.turns.lock().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[0].text, "hello there");
    }

    #[tokio::test]
    async fn assistant_deltas_flush_as_one_turn() {
        let store = Arc::new(RecordingStore::default());
        let recorder = TranscriptRecorder::new(store.clone());

        recorder.push_assistant_delta("The tide ");
        recorder.push_assistant_delta("is high at noon.");
        recorder.flush_assistant(None).await;
        // Second flush with an empty buffer must not append anything.
        recorder.flush_assistant(None).await;

        let turns = store.turns.lock().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, TurnRole::Assistant);
        assert_eq!(turns[0].text, "The tide is high at noon.");
    }

    #[tokio::test]
    async fn flush_uses_fallback_when_buffer_empty() {
        let store = Arc::new(RecordingStore::default());
        let recorder = TranscriptRecorder::new(store.clone());

        recorder.flush_assistant(Some("full transcript")).await;

        let turns = store.turns.lock().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "full transcript");
    }

    #[tokio::test]
    async fn store_failure_is_absorbed() {
        let store = Arc::new(RecordingStore::default());
        store
            .fail_creates
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let recorder = TranscriptRecorder::new(store.clone());

        // Must not panic or error out even though no record exists.
        recorder.record_user("hello").await;
        assert!(store.turns.lock().unwrap().is_empty());

        // Service recovers: the lazy retry picks it up.
        store
            .fail_creates
            .store(false, std::sync::atomic::Ordering::SeqCst);
        recorder.record_user("hello again").await;
        assert_eq!(store.turns.lock().unwrap().len(), 1);
    }
}
