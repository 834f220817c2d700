// State-machine tests driven through the pure transition function.
//
// These feed events and timer firings by hand with an explicit clock, so
// every timing-sensitive property is checked without a runtime.

use lingua_listen::engine::{EngineEvent, Fragment};
use lingua_listen::session::machine::{step, CallbackEvent, Effect, Event};
use lingua_listen::session::state::SessionState;
use lingua_listen::session::TimerId;
use lingua_listen::{RecognitionMode, SessionConfig};

fn new_session(mode: RecognitionMode) -> SessionState {
    let mut config = SessionConfig::default();
    config.recognition.mode = mode;
    let mut state = SessionState::new(config);
    step(&mut state, Event::Start, 0);
    step(&mut state, Event::Engine(EngineEvent::Started), 10);
    state
}

fn final_fragment(text: &str) -> Event {
    Event::Engine(EngineEvent::Result(vec![Fragment::final_text(text)]))
}

fn interim_fragment(text: &str) -> Event {
    Event::Engine(EngineEvent::Result(vec![Fragment::interim(text)]))
}

fn finalizes(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Emit(CallbackEvent::Finalize(text)) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn callback_count(effects: &[Effect], pred: impl Fn(&CallbackEvent) -> bool) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Emit(cb) if pred(cb)))
        .count()
}

#[test]
fn finalize_is_idempotent() {
    let mut state = new_session(RecognitionMode::Transcription);
    step(&mut state, final_fragment("hello there"), 1_000);

    let effects = step(&mut state, Event::Timer(TimerId::SentenceCompletion), 3_500);
    assert_eq!(finalizes(&effects), vec!["hello there"]);

    // Nothing new arrived; a second completion window emits nothing
    let effects = step(&mut state, Event::Timer(TimerId::SentenceCompletion), 6_000);
    assert!(finalizes(&effects).is_empty());
}

#[test]
fn realtime_mode_dispatches_each_final_fragment_alone() {
    let mut state = new_session(RecognitionMode::Realtime);

    let e1 = step(&mut state, final_fragment("first sentence"), 1_000);
    let e2 = step(&mut state, interim_fragment("second in prog"), 2_200);
    let e3 = step(&mut state, final_fragment("third sentence"), 3_400);

    assert_eq!(finalizes(&e1), vec!["first sentence"]);
    assert!(finalizes(&e2).is_empty(), "interim fragments never finalize");
    assert_eq!(finalizes(&e3), vec!["third sentence"]);

    // Final results are flagged final and carry only their own text
    assert_eq!(
        callback_count(&e1, |cb| matches!(
            cb,
            CallbackEvent::Result { text, is_final: true } if text == "first sentence"
        )),
        1
    );
    assert_eq!(
        callback_count(&e3, |cb| matches!(
            cb,
            CallbackEvent::Result { text, is_final: true } if text == "third sentence"
        )),
        1
    );
}

#[test]
fn realtime_final_fragment_dispatches_in_the_same_step() {
    let mut state = new_session(RecognitionMode::Realtime);
    let effects = step(&mut state, final_fragment("How are you"), 1_000);

    assert_eq!(
        callback_count(&effects, |cb| matches!(
            cb,
            CallbackEvent::Result { text, is_final: true } if text == "How are you"
        )),
        1
    );
    assert_eq!(finalizes(&effects), vec!["How are you"]);
}

#[test]
fn transcription_mode_accumulates_until_finalize() {
    let mut state = new_session(RecognitionMode::Transcription);

    step(&mut state, final_fragment("Hello"), 1_000);
    let effects = step(&mut state, final_fragment("world"), 2_200);
    assert_eq!(state.buffer.current(), "Hello world");
    assert_eq!(
        callback_count(&effects, |cb| matches!(
            cb,
            CallbackEvent::Result { text, is_final: false } if text == "Hello world"
        )),
        1
    );

    let effects = step(&mut state, Event::Timer(TimerId::SentenceCompletion), 5_000);
    assert_eq!(finalizes(&effects), vec!["Hello world"]);
    assert!(state.buffer.is_empty());

    // A fresh fragment starts a new utterance, not a continuation
    step(&mut state, final_fragment("again"), 6_500);
    assert_eq!(state.buffer.current(), "again");
}

#[test]
fn transcription_interim_extends_without_mutating() {
    let mut state = new_session(RecognitionMode::Transcription);
    step(&mut state, final_fragment("I want"), 1_000);

    let effects = step(&mut state, interim_fragment("to practice"), 2_200);
    assert_eq!(
        callback_count(&effects, |cb| matches!(
            cb,
            CallbackEvent::Result { text, is_final: false } if text == "I want to practice"
        )),
        1
    );
    assert_eq!(state.buffer.current(), "I want");
}

#[test]
fn no_speech_error_never_invokes_on_error() {
    let mut state = new_session(RecognitionMode::Transcription);
    step(&mut state, final_fragment("almost done"), 1_000);

    let effects = step(
        &mut state,
        Event::Engine(EngineEvent::Error(lingua_listen::ErrorCode::NoSpeech)),
        5_000,
    );

    assert_eq!(callback_count(&effects, |cb| matches!(cb, CallbackEvent::Error(_))), 0);
    assert_eq!(callback_count(&effects, |cb| matches!(cb, CallbackEvent::NoSpeech)), 1);
    // Buffered content is rescued before any restart
    assert_eq!(finalizes(&effects), vec!["almost done"]);
}

#[test]
fn unexpected_engine_ends_restart_at_most_max_times() {
    let max_attempts = SessionConfig::default().timing.max_recovery_attempts;
    let mut state = new_session(RecognitionMode::Transcription);

    let mut now = 1_000u64;
    let mut restarts = 0u32;
    let mut terminal_ends = 0usize;

    // The engine keeps dying right after every restart
    for _ in 0..(max_attempts + 3) {
        let effects = step(&mut state, Event::Engine(EngineEvent::Ended), now);
        terminal_ends += callback_count(&effects, |cb| matches!(cb, CallbackEvent::Ended));
        now += 100;

        if effects
            .iter()
            .any(|e| matches!(e, Effect::StartTimer(TimerId::Restart, _)))
        {
            let effects = step(&mut state, Event::Timer(TimerId::Restart), now);
            assert!(effects.contains(&Effect::RecreateEngine));
            assert!(effects.contains(&Effect::StartEngine));
            restarts += 1;
            now += 100;
        }
    }

    assert_eq!(restarts, max_attempts, "recreate+start cycles must be bounded");
    assert_eq!(terminal_ends, 1, "terminal end reported exactly once");
    assert!(!state.is_listening);
}

#[test]
fn adaptive_threshold_stays_bounded_under_extreme_pacing() {
    let config = SessionConfig::default();
    let min = config.timing.min_silence_threshold;
    let max = config.timing.max_silence_threshold;

    let mut state = new_session(RecognitionMode::Transcription);
    let mut now = 1_000u64;
    for gap in [0u64, 100_000, 0, 100_000, 100_000, 3, 250_000, 1] {
        now += gap.max(1_100); // keep past the timer-reset rate limit
        step(&mut state, final_fragment("chunk"), now);
        let threshold = state.adaptive.threshold();
        assert!(
            threshold >= min && threshold <= max,
            "threshold {threshold:?} escaped [{min:?}, {max:?}]"
        );
    }
}

#[test]
fn stop_right_after_fragment_finalizes_exactly_once() {
    let mut state = new_session(RecognitionMode::Transcription);
    step(&mut state, final_fragment("send this"), 1_000);

    let effects = step(&mut state, Event::Stop, 1_050);
    assert_eq!(finalizes(&effects), vec!["send this"]);
    assert!(effects.contains(&Effect::CancelAllTimers));

    // The sentence-completion timer it orphaned cannot fire a duplicate
    let effects = step(&mut state, Event::Timer(TimerId::SentenceCompletion), 3_500);
    assert!(finalizes(&effects).is_empty());
    assert_eq!(state.utterances_finalized, 1);
}

#[test]
fn silence_triggers_auto_send_and_stop() {
    let mut state = new_session(RecognitionMode::Transcription);
    assert!(state.should_stop_after_silence);

    step(&mut state, final_fragment("I want to practice speaking"), 1_000);

    // Sentence completion finalizes the utterance first
    let effects = step(&mut state, Event::Timer(TimerId::SentenceCompletion), 3_500);
    assert_eq!(finalizes(&effects), vec!["I want to practice speaking"]);

    // Adaptive threshold (8s) + debounce passes with a quiet microphone
    let effects = step(&mut state, Event::Timer(TimerId::Silence), 12_100);
    assert_eq!(callback_count(&effects, |cb| matches!(cb, CallbackEvent::Silence)), 1);
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::StartTimer(TimerId::PendingStop, _))));

    // Grace period passes without new speech: the session stops
    let effects = step(&mut state, Event::Timer(TimerId::PendingStop), 14_200);
    assert_eq!(callback_count(&effects, |cb| matches!(cb, CallbackEvent::Ended)), 1);
    assert!(!state.is_listening);
    assert_eq!(state.utterances_finalized, 1);
}

#[test]
fn fresh_speech_during_grace_period_cancels_the_stop() {
    let mut state = new_session(RecognitionMode::Transcription);
    step(&mut state, final_fragment("not done yet"), 1_000);
    step(&mut state, Event::Timer(TimerId::Silence), 12_100);

    // The user speaks again before the pending stop fires
    let effects = step(&mut state, Event::Engine(EngineEvent::SpeechStart), 13_000);
    assert!(effects.contains(&Effect::CancelTimer(TimerId::PendingStop)));

    // Even a stale firing is ignored while speech is recent
    let effects = step(&mut state, Event::Timer(TimerId::PendingStop), 13_500);
    assert_eq!(callback_count(&effects, |cb| matches!(cb, CallbackEvent::Ended)), 0);
    assert!(state.is_listening);
}

#[test]
fn trigger_no_speech_finalizes_and_stops_when_configured() {
    let mut state = new_session(RecognitionMode::Transcription);
    step(&mut state, final_fragment("manual path"), 1_000);

    let effects = step(&mut state, Event::TriggerNoSpeech, 2_000);
    assert_eq!(callback_count(&effects, |cb| matches!(cb, CallbackEvent::NoSpeech)), 1);
    assert_eq!(finalizes(&effects), vec!["manual path"]);
    assert_eq!(callback_count(&effects, |cb| matches!(cb, CallbackEvent::Ended)), 1);
}
