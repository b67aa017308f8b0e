use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

/// Minimum length (in characters, `?` included) for an extracted question.
const MIN_QUESTION_CHARS: usize = 3;

/// Extract the question from a finalized turn, if it contains one.
///
/// Takes the last line containing a `?`, truncates it at the last `?`, and
/// keeps the trailing sentence. Fragments shorter than three characters are
/// discarded as noise.
pub fn extract_question(turn: &str) -> Option<String> {
    let line = turn.lines().filter(|line| line.contains('?')).last()?;

    let cut = line.rfind('?')?;
    let through = &line[..=cut];

    // Trailing sentence only: text after the last earlier sentence end
    let body = &through[..through.len() - 1];
    let start = body
        .rfind(&['.', '!', '?'][..])
        .map(|i| i + 1)
        .unwrap_or(0);

    let question = through[start..].trim();
    if question.chars().count() < MIN_QUESTION_CHARS {
        return None;
    }

    Some(question.to_string())
}

/// Detects questions in finalized turns and deduplicates them.
///
/// Membership test and insert are one atomic operation under the lock, so
/// near-simultaneous repeated turns dispatch at most one answer request.
/// The set lives for one recording session.
pub struct QuestionTrigger {
    answered: Mutex<HashSet<String>>,
}

impl QuestionTrigger {
    pub fn new() -> Self {
        Self {
            answered: Mutex::new(HashSet::new()),
        }
    }

    /// Clear the answered set at the start of a recording session.
    pub fn reset(&self) {
        self.answered.lock().unwrap().clear();
    }

    /// Inspect a finalized turn; returns the question when it is new.
    ///
    /// Dedup keys are lowercase-normalized, so the same question asked with
    /// different casing fires once.
    pub fn observe_turn(&self, turn: &str) -> Option<String> {
        let question = extract_question(turn)?;
        let key = question.to_lowercase();

        let mut answered = self.answered.lock().unwrap();
        if !answered.insert(key) {
            debug!("Question already answered, skipping: {}", question);
            return None;
        }

        Some(question)
    }
}

impl Default for QuestionTrigger {
    fn default() -> Self {
        Self::new()
    }
}
