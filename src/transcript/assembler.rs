use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A finalized turn emitted to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Position of this turn within the session (0-indexed)
    pub turn_index: usize,

    /// Trimmed turn text; empty when the turn carried no content
    pub text: String,

    /// When the turn was finalized
    pub timestamp: DateTime<Utc>,
}

impl TurnRecord {
    /// True when the turn carried no usable text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Default)]
struct AssemblerState {
    /// Text accumulated for the current turn
    turn_buffer: String,
    /// Longest displayed text seen so far across turns
    rolling: String,
    turns_completed: usize,
}

/// Reconstructs a clean transcript from provider fragments.
///
/// Two independent behaviors, one lock-protected state object:
/// turn accumulation (append each input delta verbatim, drain on turn
/// boundary) and the overlap-resolving display delta for providers that
/// resend growing cumulative text instead of increments. The rolling view
/// lives for the whole session; the turn buffer is cleared at every turn
/// boundary and before each reconnect attempt.
pub struct TranscriptAssembler {
    inner: Mutex<AssemblerState>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AssemblerState::default()),
        }
    }

    /// Clear all state at session start.
    pub fn reset(&self) {
        let mut state = self.inner.lock().unwrap();
        *state = AssemblerState::default();
    }

    /// Append one input transcription delta to the current turn.
    pub fn append_delta(&self, text: &str) {
        let mut state = self.inner.lock().unwrap();
        state.turn_buffer.push_str(text);
    }

    /// Discard the current turn without emitting it.
    ///
    /// Used before a reconnect attempt: a mid-turn partial cannot be
    /// meaningfully resumed on a new connection.
    pub fn clear_turn(&self) {
        let mut state = self.inner.lock().unwrap();
        state.turn_buffer.clear();
    }

    /// Finalize the current turn and clear the buffer.
    ///
    /// Whitespace-only turns produce a record with empty text so callers
    /// still observe the boundary.
    pub fn complete_turn(&self) -> TurnRecord {
        let mut state = self.inner.lock().unwrap();
        let text = std::mem::take(&mut state.turn_buffer).trim().to_string();
        let turn_index = state.turns_completed;
        state.turns_completed += 1;

        TurnRecord {
            turn_index,
            text,
            timestamp: Utc::now(),
        }
    }

    /// Number of turns finalized so far.
    pub fn turns_completed(&self) -> usize {
        self.inner.lock().unwrap().turns_completed
    }

    /// Resolve a cumulative text snapshot against the rolling view.
    ///
    /// Returns the minimal new suffix to display, or `None` when the
    /// snapshot adds nothing. The rolling text only ever grows.
    pub fn merge_display(&self, new_text: &str) -> Option<String> {
        let mut state = self.inner.lock().unwrap();
        merge_overlap(&mut state.rolling, new_text)
    }

    /// Current rolling display text.
    pub fn rolling_text(&self) -> String {
        self.inner.lock().unwrap().rolling.clone()
    }
}

impl Default for TranscriptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlap-merge between the previous full text and a new snapshot.
///
/// Precedence, first match wins:
///   a. equal (case-insensitive)                  -> nothing new
///   b. new extends previous                      -> emit the extension
///   c. new is a prefix of previous               -> nothing new
///   d. longest suffix of previous that prefixes new -> emit the remainder
///   e. new already contained in previous         -> nothing new
///   f. unrelated                                 -> emit on a new line
///
/// Case (e) deliberately drops repeated phrasing that reappears mid-string;
/// the precedence order is contract, not an implementation detail.
fn merge_overlap(prev: &mut String, new_text: &str) -> Option<String> {
    if prev.to_lowercase() == new_text.to_lowercase() {
        return None;
    }

    if new_text.starts_with(prev.as_str()) {
        let delta = new_text[prev.len()..].to_string();
        *prev = new_text.to_string();
        return Some(delta);
    }

    if prev.starts_with(new_text) {
        return None;
    }

    let mut k = prev.len().min(new_text.len());
    while k >= 1 {
        if new_text.is_char_boundary(k) && prev.ends_with(&new_text[..k]) {
            if k == new_text.len() {
                return None;
            }
            let delta = new_text[k..].to_string();
            prev.push_str(&delta);
            return Some(delta);
        }
        k -= 1;
    }

    if prev.contains(new_text) {
        return None;
    }

    let delta = format!("\n{}", new_text);
    prev.push_str(&delta);
    Some(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_emits_suffix() {
        let mut prev = "hello wor".to_string();
        let delta = merge_overlap(&mut prev, "hello world");
        assert_eq!(delta.as_deref(), Some("ld"));
        assert_eq!(prev, "hello world");
    }

    #[test]
    fn test_equal_case_insensitive_is_silent() {
        let mut prev = "Hello World".to_string();
        assert_eq!(merge_overlap(&mut prev, "hello world"), None);
        assert_eq!(prev, "Hello World");
    }

    #[test]
    fn test_suffix_prefix_overlap() {
        let mut prev = "one two three".to_string();
        let delta = merge_overlap(&mut prev, "three four");
        assert_eq!(delta.as_deref(), Some(" four"));
        assert_eq!(prev, "one two three four");
    }

    #[test]
    fn test_unrelated_starts_new_line() {
        let mut prev = "alpha".to_string();
        let delta = merge_overlap(&mut prev, "beta");
        assert_eq!(delta.as_deref(), Some("\nbeta"));
        assert_eq!(prev, "alpha\nbeta");
    }

    #[test]
    fn test_mid_string_repeat_is_dropped() {
        let mut prev = "say hello to everyone".to_string();
        assert_eq!(merge_overlap(&mut prev, "hello to"), None);
        assert_eq!(prev, "say hello to everyone");
    }
}
