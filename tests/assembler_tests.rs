// Transcript assembler tests
//
// Turn accumulation (append-only, drained on turn boundaries) and the
// overlap-resolving display delta, including its guarantees: idempotence,
// monotonic growth, and minimal emitted suffixes.

use live_assist::TranscriptAssembler;

#[test]
fn test_turn_is_concatenation_of_deltas_trimmed() {
    let assembler = TranscriptAssembler::new();

    assembler.append_delta(" hello ");
    assembler.append_delta("world");
    assembler.append_delta("  ");

    let record = assembler.complete_turn();
    assert_eq!(record.text, "hello world");
    assert_eq!(record.turn_index, 0);
}

#[test]
fn test_whitespace_only_turn_is_emitted_empty() {
    let assembler = TranscriptAssembler::new();

    assembler.append_delta("   \n ");
    let record = assembler.complete_turn();

    assert!(record.is_empty());
    assert_eq!(record.turn_index, 0);
    // The boundary still advanced the turn counter
    assert_eq!(assembler.turns_completed(), 1);
}

#[test]
fn test_turn_indices_increment() {
    let assembler = TranscriptAssembler::new();

    assembler.append_delta("first");
    assert_eq!(assembler.complete_turn().turn_index, 0);
    assembler.append_delta("second");
    assert_eq!(assembler.complete_turn().turn_index, 1);
}

#[test]
fn test_clear_turn_discards_partial_text() {
    let assembler = TranscriptAssembler::new();

    assembler.append_delta("stale partial");
    assembler.clear_turn();
    assembler.append_delta("fresh");

    assert_eq!(assembler.complete_turn().text, "fresh");
}

#[test]
fn test_merge_extension_emits_suffix() {
    let assembler = TranscriptAssembler::new();

    assert_eq!(
        assembler.merge_display("hello wor").as_deref(),
        Some("hello wor")
    );
    assert_eq!(assembler.merge_display("hello world").as_deref(), Some("ld"));
    assert_eq!(assembler.rolling_text(), "hello world");
}

#[test]
fn test_merge_is_idempotent() {
    let assembler = TranscriptAssembler::new();

    assert!(assembler.merge_display("the same text").is_some());
    assert_eq!(assembler.merge_display("the same text"), None);
    assert_eq!(assembler.merge_display("The Same Text"), None);
}

#[test]
fn test_merge_prefix_already_shown() {
    let assembler = TranscriptAssembler::new();

    assembler.merge_display("a longer snapshot");
    assert_eq!(assembler.merge_display("a longer"), None);
    assert_eq!(assembler.rolling_text(), "a longer snapshot");
}

#[test]
fn test_merge_suffix_prefix_overlap() {
    let assembler = TranscriptAssembler::new();

    assembler.merge_display("we should deploy on");
    let delta = assembler.merge_display("on friday morning");

    assert_eq!(delta.as_deref(), Some(" friday morning"));
    assert_eq!(assembler.rolling_text(), "we should deploy on friday morning");
}

#[test]
fn test_merge_unrelated_text_starts_new_line() {
    let assembler = TranscriptAssembler::new();

    assembler.merge_display("first topic");
    let delta = assembler.merge_display("second topic");

    assert_eq!(delta.as_deref(), Some("\nsecond topic"));
    assert_eq!(assembler.rolling_text(), "first topic\nsecond topic");
}

#[test]
fn test_merge_mid_string_substring_is_dropped() {
    let assembler = TranscriptAssembler::new();

    assembler.merge_display("we said hello there earlier");
    assert_eq!(assembler.merge_display("hello there"), None);
}

#[test]
fn test_merge_rolling_text_never_shrinks() {
    let assembler = TranscriptAssembler::new();
    let snapshots = [
        "the quick",
        "the quick brown",
        "the quick",
        "brown fox jumps",
        "unrelated aside",
        "the quick brown fox",
    ];

    let mut last_len = 0;
    for snapshot in snapshots {
        assembler.merge_display(snapshot);
        let rolling = assembler.rolling_text();
        assert!(
            rolling.len() >= last_len,
            "rolling text shrank after {:?}: {:?}",
            snapshot,
            rolling
        );
        last_len = rolling.len();
    }
}

#[test]
fn test_merge_never_emits_empty_delta() {
    let assembler = TranscriptAssembler::new();
    let snapshots = ["abc", "abc", "abcdef", "def", "xyz", "xyzabc", "abc"];

    for snapshot in snapshots {
        if let Some(delta) = assembler.merge_display(snapshot) {
            assert!(!delta.is_empty(), "empty delta emitted for {:?}", snapshot);
        }
    }
}

#[test]
fn test_reset_clears_rolling_view_and_turns() {
    let assembler = TranscriptAssembler::new();

    assembler.merge_display("old session text");
    assembler.append_delta("old turn");
    assembler.complete_turn();
    assembler.reset();

    assert_eq!(assembler.rolling_text(), "");
    assert_eq!(assembler.turns_completed(), 0);
    assert_eq!(
        assembler.merge_display("old session text").as_deref(),
        Some("old session text")
    );
}
