//! Session state machine
//!
//! Every engine event, timer firing and caller command funnels through
//! [`step`], which mutates the [`SessionState`] and returns the side
//! effects to perform. The function itself never touches a timer, an
//! engine or a callback, which keeps the whole machine testable with a
//! plain millisecond counter.

use crate::config::{RecognitionMode, RecognitionOptions};
use crate::engine::{EngineEvent, ErrorCode, Fragment};
use crate::session::recovery::RecoveryDecision;
use crate::session::scheduler::TimerId;
use crate::session::state::{Phase, SessionState, Status};
use crate::transcript::split_fragments;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Input to the state machine
#[derive(Debug, Clone)]
pub enum Event {
    /// Caller asked to start listening
    Start,
    /// Caller asked to stop listening
    Stop,
    /// Caller replaced the engine options
    SetOptions(RecognitionOptions),
    /// Caller switched operating mode
    SetMode(RecognitionMode),
    /// Caller toggled stop-after-silence
    SetShouldStopAfterSilence(bool),
    /// Caller forced the no-speech path
    TriggerNoSpeech,
    /// Event from the live engine instance
    Engine(EngineEvent),
    /// A named timer fired
    Timer(TimerId),
    /// A microphone loudness sample arrived
    Sound(f32),
    /// The controller failed to start or recreate the engine
    EngineFault(ErrorCode),
}

/// Callback to surface to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    Started,
    Ended,
    Error(ErrorCode),
    Result { text: String, is_final: bool },
    SoundLevel(f32),
    NoSpeech,
    Silence,
    Finalize(String),
    SpeechStart,
}

/// Side effect for the session loop to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Swap in a fresh engine instance with current configuration
    RecreateEngine,
    StartEngine,
    StopEngine,
    /// Push new options to the engine adapter
    ConfigureEngine(RecognitionOptions),
    /// Acquire the microphone and begin loudness sampling
    StartAudio,
    /// Release the microphone
    StopAudio,
    StartTimer(TimerId, Duration),
    CancelTimer(TimerId),
    CancelAllTimers,
    Emit(CallbackEvent),
}

/// Advance the machine by one event
///
/// `now_ms` is the session's monotonic clock in milliseconds. Effects are
/// returned in the order they must be performed.
pub fn step(state: &mut SessionState, event: Event, now_ms: u64) -> Vec<Effect> {
    let mut effects = Vec::new();
    match event {
        Event::Start => start_requested(state, now_ms, &mut effects),
        Event::Stop => do_stop(state, &mut effects),
        Event::SetOptions(options) => set_options(state, options, &mut effects),
        Event::SetMode(mode) => set_mode(state, mode, &mut effects),
        Event::SetShouldStopAfterSilence(flag) => {
            debug!(stop_after_silence = flag, "Stop-after-silence updated");
            state.should_stop_after_silence = flag;
        }
        Event::TriggerNoSpeech => trigger_no_speech(state, &mut effects),
        Event::Engine(engine_event) => on_engine_event(state, engine_event, now_ms, &mut effects),
        Event::Timer(id) => on_timer(state, id, now_ms, &mut effects),
        Event::Sound(level) => on_sound_level(state, level, now_ms, &mut effects),
        Event::EngineFault(code) => on_engine_failure(state, code, now_ms, &mut effects),
    }
    effects
}

fn start_requested(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    if matches!(state.phase, Phase::Starting | Phase::Restarting) {
        debug!(phase = ?state.phase, "Start ignored, engine bring-up already in flight");
        return;
    }

    // Rate-limit rapid restarts; a queued pending start fires once the
    // window clears
    if let Some(last_start) = state.last_start_ms {
        let window = state.config.timing.min_time_between_restarts.as_millis() as u64;
        let elapsed = now_ms.saturating_sub(last_start);
        if elapsed < window {
            debug!("Start requested {elapsed}ms after previous start, deferring");
            state.pending_restart = true;
            effects.push(Effect::StartTimer(
                TimerId::PendingStart,
                Duration::from_millis(window - elapsed),
            ));
            return;
        }
    }

    do_start(state, now_ms, effects);
}

fn do_start(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    info!(mode = ?state.mode, session = %state.config.session_id, "Starting recognition session");

    state.last_start_ms = Some(now_ms);
    state.phase = Phase::Starting;
    state.status = Status::Listening;
    state.is_listening = true;
    state.pending_restart = false;
    state.end_reported = false;
    state.has_received_results = false;
    state.is_speaking = false;
    state.last_speech_ms = now_ms;
    state.should_stop_after_silence = state.in_transcription_mode();

    state.buffer.clear();
    state.adaptive.reset();
    state.recovery.reset();

    effects.push(Effect::CancelAllTimers);
    effects.push(Effect::RecreateEngine);
    effects.push(Effect::StartEngine);
    effects.push(Effect::StartAudio);
    effects.push(Effect::StartTimer(
        TimerId::NoSpeech,
        state.config.recognition.no_speech_timeout,
    ));
    if state.in_transcription_mode() {
        effects.push(Effect::StartTimer(
            TimerId::AutoStop,
            state.config.timing.max_listening_time,
        ));
    }
}

fn do_stop(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if state.phase == Phase::Idle && !state.is_listening {
        debug!("Stop requested while already idle");
        return;
    }

    info!(session = %state.config.session_id, "Stopping recognition session");

    // Listening goes false before any teardown so in-flight timer
    // callbacks no-op against this session
    state.is_listening = false;
    state.pending_restart = false;
    state.phase = Phase::Stopping;

    effects.push(Effect::CancelAllTimers);
    effects.push(Effect::StopEngine);
    effects.push(Effect::StopAudio);

    // Never discard unsent user speech
    finalize(state, effects);

    state.phase = Phase::Idle;
    if state.status != Status::Error {
        state.status = Status::Inactive;
    }
    emit_ended_once(state, effects);
}

fn set_options(state: &mut SessionState, options: RecognitionOptions, effects: &mut Vec<Effect>) {
    debug!(language = %options.language, mode = ?options.mode, "Session options updated");
    state.mode = options.mode;
    state.should_stop_after_silence = state.in_transcription_mode();
    state.config.recognition = options.clone();
    effects.push(Effect::ConfigureEngine(options));
}

fn set_mode(state: &mut SessionState, mode: RecognitionMode, effects: &mut Vec<Effect>) {
    info!(?mode, "Recognition mode set");
    state.mode = mode;
    state.config.recognition.mode = mode;
    state.should_stop_after_silence = mode == RecognitionMode::Transcription;

    // An active session restarts so the new mode governs a clean utterance
    if state.is_listening {
        debug!("Restarting session for mode change");
        do_stop(state, effects);
        state.pending_restart = true;
        effects.push(Effect::StartTimer(
            TimerId::PendingStart,
            state.config.timing.mode_change_restart_delay,
        ));
    }
}

fn trigger_no_speech(state: &mut SessionState, effects: &mut Vec<Effect>) {
    debug!("No-speech path triggered manually");
    effects.push(Effect::Emit(CallbackEvent::NoSpeech));

    if state.in_transcription_mode() && !state.buffer.is_empty() {
        finalize(state, effects);
        if state.should_stop_after_silence {
            do_stop(state, effects);
        }
    }
}

fn on_engine_event(
    state: &mut SessionState,
    event: EngineEvent,
    now_ms: u64,
    effects: &mut Vec<Effect>,
) {
    match event {
        EngineEvent::Started => {
            debug!("Engine confirmed start");
            state.phase = Phase::Listening;
            state.status = Status::Listening;
            effects.push(Effect::Emit(CallbackEvent::Started));
        }
        EngineEvent::Ended => on_engine_ended(state, now_ms, effects),
        EngineEvent::Error(code) => {
            if code.is_no_speech() {
                on_no_speech_error(state, now_ms, effects);
            } else {
                on_engine_failure(state, code, now_ms, effects);
            }
        }
        EngineEvent::Result(fragments) => on_result(state, &fragments, now_ms, effects),
        EngineEvent::SpeechStart => on_speech_start(state, now_ms, effects),
        EngineEvent::SpeechEnd => on_speech_end(state, now_ms, effects),
        EngineEvent::NoMatch => {
            debug!("Engine heard sound but produced no hypothesis");
        }
    }
}

fn on_result(
    state: &mut SessionState,
    fragments: &[Fragment],
    now_ms: u64,
    effects: &mut Vec<Effect>,
) {
    if !state.is_listening {
        debug!("Result dropped, session no longer listening");
        return;
    }

    state.status = Status::Processing;
    state.last_speech_ms = now_ms;
    state.is_speaking = true;
    state.has_received_results = true;
    state.fragments_seen += fragments.len() as u64;

    if state.may_reset_timers(now_ms) {
        effects.push(Effect::StartTimer(
            TimerId::NoSpeech,
            state.config.recognition.no_speech_timeout,
        ));
        effects.push(Effect::StartTimer(TimerId::Silence, silence_timer_duration(state)));
    }

    let (final_text, interim_text) = split_fragments(fragments);

    match state.mode {
        RecognitionMode::Realtime => {
            // Each finalized fragment is its own complete utterance;
            // nothing is buffered
            if !final_text.trim().is_empty() {
                debug!(text = %final_text, "Realtime final fragment");
                effects.push(Effect::Emit(CallbackEvent::Result {
                    text: final_text.clone(),
                    is_final: true,
                }));
                state.utterances_finalized += 1;
                effects.push(Effect::Emit(CallbackEvent::Finalize(final_text)));
            }
            if !interim_text.is_empty() {
                effects.push(Effect::Emit(CallbackEvent::Result {
                    text: interim_text,
                    is_final: false,
                }));
            }
        }
        RecognitionMode::Transcription => {
            if !final_text.trim().is_empty() {
                let current = state.buffer.push_final(&final_text).to_string();
                debug!(transcript = %current, "Accumulated transcript");

                effects.push(Effect::Emit(CallbackEvent::Result {
                    text: current,
                    is_final: false,
                }));
                effects.push(Effect::StartTimer(
                    TimerId::SentenceCompletion,
                    state.config.timing.sentence_completion_delay,
                ));
                state.adaptive.record_sentence_end(now_ms);
            }
            if !interim_text.is_empty() {
                effects.push(Effect::Emit(CallbackEvent::Result {
                    text: state.buffer.with_interim(&interim_text),
                    is_final: false,
                }));
            }
        }
    }

    state.status = if state.is_listening { Status::Listening } else { Status::Inactive };
}

fn on_speech_start(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    debug!("Speech started");
    state.is_speaking = true;
    state.last_speech_ms = now_ms;

    // Fresh speech cancels a pending stop outright, regardless of the
    // timer-reset rate limit
    effects.push(Effect::CancelTimer(TimerId::PendingStop));

    if state.may_reset_timers(now_ms) {
        effects.push(Effect::CancelTimer(TimerId::Silence));
        effects.push(Effect::StartTimer(
            TimerId::NoSpeech,
            state.config.recognition.no_speech_timeout,
        ));
    }

    effects.push(Effect::Emit(CallbackEvent::SpeechStart));
}

fn on_speech_end(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    debug!("Speech ended");
    state.is_speaking = false;

    if state.may_reset_timers(now_ms) {
        effects.push(Effect::StartTimer(TimerId::Silence, silence_timer_duration(state)));
    }
}

fn on_engine_ended(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    debug!(listening = state.is_listening, phase = ?state.phase, "Engine ended");

    effects.push(Effect::CancelTimer(TimerId::NoSpeech));
    effects.push(Effect::CancelTimer(TimerId::Silence));
    effects.push(Effect::CancelTimer(TimerId::AutoStop));

    match state.phase {
        // Expected terminations and in-flight restarts need no recovery
        Phase::Restarting => {}
        Phase::Stopping | Phase::Idle => {
            state.phase = Phase::Idle;
            if state.status != Status::Error {
                state.status = Status::Inactive;
            }
            emit_ended_once(state, effects);
        }
        _ if state.is_listening => {
            warn!("Engine terminated unexpectedly while session wants to listen");
            schedule_recovery(state, now_ms, None, effects);
        }
        _ => {
            state.phase = Phase::Idle;
            emit_ended_once(state, effects);
        }
    }
}

fn on_no_speech_error(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    // Expected silence, never a failure
    debug!("Engine reported no-speech");
    effects.push(Effect::Emit(CallbackEvent::NoSpeech));

    if state.in_transcription_mode() && !state.buffer.is_empty() {
        finalize(state, effects);
    }

    if state.is_listening && state.config.recognition.continuous {
        schedule_recovery(state, now_ms, None, effects);
    }
}

fn on_engine_failure(
    state: &mut SessionState,
    code: ErrorCode,
    now_ms: u64,
    effects: &mut Vec<Effect>,
) {
    // A session that already failed terminally reports nothing further
    if state.status == Status::Error && !state.is_listening {
        debug!(code = %code, "Ignoring engine failure after terminal error");
        return;
    }

    warn!(code = %code, "Engine failure");
    state.status = Status::Error;

    if code.is_fatal() {
        // Retrying an absent capability cannot succeed
        terminal_failure(state, Some(code), effects);
        return;
    }

    if state.is_listening {
        schedule_recovery(state, now_ms, Some(code), effects);
    } else {
        effects.push(Effect::Emit(CallbackEvent::Error(code)));
    }
}

fn schedule_recovery(
    state: &mut SessionState,
    now_ms: u64,
    code: Option<ErrorCode>,
    effects: &mut Vec<Effect>,
) {
    match state.recovery.on_failure(now_ms) {
        RecoveryDecision::RestartAfter { delay, attempt } => {
            info!(attempt, ?delay, "Scheduling engine restart");
            state.phase = Phase::Restarting;

            // Errors surface once per episode, not once per retry
            if let Some(code) = code {
                if state.recovery.episode_started() {
                    effects.push(Effect::Emit(CallbackEvent::Error(code)));
                }
            }

            effects.push(Effect::StartTimer(TimerId::Restart, delay));
        }
        RecoveryDecision::GiveUp => {
            warn!("Recovery attempts exhausted");
            terminal_failure(state, Some(ErrorCode::RecoveryExhausted), effects);
        }
    }
}

/// The one place automatic recovery deliberately gives up
fn terminal_failure(state: &mut SessionState, code: Option<ErrorCode>, effects: &mut Vec<Effect>) {
    state.is_listening = false;
    state.pending_restart = false;
    state.phase = Phase::Idle;
    state.status = Status::Error;

    effects.push(Effect::CancelAllTimers);
    effects.push(Effect::StopEngine);
    effects.push(Effect::StopAudio);

    finalize(state, effects);

    if let Some(code) = code {
        effects.push(Effect::Emit(CallbackEvent::Error(code)));
    }
    emit_ended_once(state, effects);
}

fn on_timer(state: &mut SessionState, id: TimerId, now_ms: u64, effects: &mut Vec<Effect>) {
    match id {
        TimerId::PendingStart => {
            if state.pending_restart {
                state.pending_restart = false;
                do_start(state, now_ms, effects);
            }
        }
        TimerId::Restart => on_restart_timer(state, effects),
        TimerId::NoSpeech => on_no_speech_timer(state, now_ms, effects),
        TimerId::Silence => on_silence_timer(state, now_ms, effects),
        TimerId::SentenceCompletion => {
            if state.is_listening && state.in_transcription_mode() && !state.buffer.is_empty() {
                debug!("Finalizing transcript, sentence completion window elapsed");
                finalize(state, effects);
            }
        }
        TimerId::AutoStop => {
            if state.is_listening && state.in_transcription_mode() {
                info!("Max listening time reached, auto-stopping");
                do_stop(state, effects);
            }
        }
        TimerId::PendingStop => on_pending_stop_timer(state, now_ms, effects),
    }
}

fn on_restart_timer(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if !state.is_listening {
        state.phase = Phase::Idle;
        return;
    }

    debug!("Executing scheduled engine restart");
    state.phase = Phase::Starting;
    effects.push(Effect::RecreateEngine);
    effects.push(Effect::StartEngine);
    effects.push(Effect::StartTimer(
        TimerId::NoSpeech,
        state.config.recognition.no_speech_timeout,
    ));
    if state.in_transcription_mode() {
        effects.push(Effect::StartTimer(
            TimerId::AutoStop,
            state.config.timing.max_listening_time,
        ));
    }
}

fn on_no_speech_timer(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    if !state.is_listening {
        return;
    }

    let timeout = state.config.recognition.no_speech_timeout.as_millis() as u64;
    let since_speech = now_ms.saturating_sub(state.last_speech_ms);
    if since_speech < timeout {
        // Sound-level activity refreshed last_speech since this arming
        return;
    }

    info!(since_speech_ms = since_speech, "No speech detected within timeout");
    effects.push(Effect::Emit(CallbackEvent::NoSpeech));

    if state.has_received_results && state.in_transcription_mode() && !state.buffer.is_empty() {
        finalize(state, effects);
        if state.should_stop_after_silence {
            do_stop(state, effects);
            return;
        }
    }

    // Still wanted: cycle the engine rather than sitting deaf
    schedule_recovery(state, now_ms, None, effects);
}

fn on_silence_timer(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    if !state.is_listening {
        return;
    }

    let threshold = state.adaptive.threshold().as_millis() as u64;

    // The recognizer reported speech-end, but the microphone disagrees:
    // treat as a false alarm and keep listening
    let veto_level =
        state.config.sound.sound_threshold * state.config.sound.still_speaking_factor;
    if state.last_sound_level > veto_level {
        debug!(
            level = state.last_sound_level,
            "Sound level says still speaking, skipping finalize"
        );
        return;
    }

    let since_speech = now_ms.saturating_sub(state.last_speech_ms);
    if since_speech <= threshold {
        return;
    }

    info!(since_speech_ms = since_speech, "Silence detected");
    effects.push(Effect::Emit(CallbackEvent::Silence));

    if state.in_transcription_mode() && !state.buffer.is_empty() {
        finalize(state, effects);
    }

    if state.should_stop_after_silence && state.has_received_results {
        // Grace delay before the actual stop; fresh speech cancels it
        effects.push(Effect::StartTimer(
            TimerId::PendingStop,
            state.config.timing.pending_stop_grace,
        ));
    }
}

fn on_pending_stop_timer(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    if !state.is_listening {
        return;
    }

    let threshold = state.adaptive.threshold().as_millis() as u64;
    if now_ms.saturating_sub(state.last_speech_ms) > threshold {
        info!("Stopping after silence");
        do_stop(state, effects);
    } else {
        debug!("Speech resumed during stop grace period, canceling stop");
    }
}

fn on_sound_level(state: &mut SessionState, level: f32, now_ms: u64, effects: &mut Vec<Effect>) {
    state.last_sound_level = level;
    if level > state.config.sound.sound_threshold {
        state.last_speech_ms = now_ms;
    }
    effects.push(Effect::Emit(CallbackEvent::SoundLevel(level)));
}

/// Emit the finalized transcript, clearing buffers first
///
/// No-op on an empty buffer, which makes every finalize path idempotent.
fn finalize(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if let Some(text) = state.buffer.take_final() {
        info!(text = %text, "Finalizing transcript");
        state.utterances_finalized += 1;
        effects.push(Effect::Emit(CallbackEvent::Finalize(text)));
    }
}

fn emit_ended_once(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if !state.end_reported {
        state.end_reported = true;
        effects.push(Effect::Emit(CallbackEvent::Ended));
    }
}

fn silence_timer_duration(state: &SessionState) -> Duration {
    // Fixed debounce on top of the adaptive threshold absorbs
    // sound-level jitter
    state.adaptive.threshold() + state.config.timing.silence_debounce
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn started_state(mode: RecognitionMode) -> SessionState {
        let mut config = SessionConfig::default();
        config.recognition.mode = mode;
        let mut state = SessionState::new(config);
        step(&mut state, Event::Start, 0);
        step(&mut state, Event::Engine(EngineEvent::Started), 10);
        state
    }

    fn emitted(effects: &[Effect]) -> Vec<&CallbackEvent> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(cb) => Some(cb),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_brings_up_engine_audio_and_timers() {
        let mut state = SessionState::new(SessionConfig::default());
        let effects = step(&mut state, Event::Start, 0);

        assert!(effects.contains(&Effect::RecreateEngine));
        assert!(effects.contains(&Effect::StartEngine));
        assert!(effects.contains(&Effect::StartAudio));
        assert!(matches!(state.phase, Phase::Starting));
        assert!(state.is_listening);
        // Transcription mode arms the hard ceiling
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartTimer(TimerId::AutoStop, _))));
    }

    #[test]
    fn rapid_restart_is_deferred() {
        let mut state = SessionState::new(SessionConfig::default());
        step(&mut state, Event::Start, 0);
        step(&mut state, Event::Engine(EngineEvent::Started), 10);
        step(&mut state, Event::Stop, 20);

        let effects = step(&mut state, Event::Start, 300);
        assert!(!effects.contains(&Effect::StartEngine));
        assert!(state.pending_restart);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartTimer(TimerId::PendingStart, _))));

        // The deferred start executes once the window clears
        let effects = step(&mut state, Event::Timer(TimerId::PendingStart), 1_100);
        assert!(effects.contains(&Effect::StartEngine));
    }

    #[test]
    fn stop_finalizes_buffered_transcript_once() {
        let mut state = started_state(RecognitionMode::Transcription);
        step(
            &mut state,
            Event::Engine(EngineEvent::Result(vec![Fragment::final_text("hold this")])),
            2_000,
        );

        let effects = step(&mut state, Event::Stop, 2_500);
        let finals: Vec<_> = emitted(&effects)
            .into_iter()
            .filter(|cb| matches!(cb, CallbackEvent::Finalize(_)))
            .collect();
        assert_eq!(finals, vec![&CallbackEvent::Finalize("hold this".into())]);
        assert!(effects.contains(&Effect::CancelAllTimers));

        // The orphaned sentence-completion timer cannot double-finalize
        let effects = step(&mut state, Event::Timer(TimerId::SentenceCompletion), 4_500);
        assert!(emitted(&effects).is_empty());
    }

    #[test]
    fn no_speech_engine_error_never_reaches_on_error() {
        let mut state = started_state(RecognitionMode::Transcription);
        let effects = step(
            &mut state,
            Event::Engine(EngineEvent::Error(ErrorCode::NoSpeech)),
            3_000,
        );

        assert!(emitted(&effects).contains(&&CallbackEvent::NoSpeech));
        assert!(!emitted(&effects)
            .iter()
            .any(|cb| matches!(cb, CallbackEvent::Error(_))));
    }

    #[test]
    fn transient_error_reports_once_per_episode() {
        let mut state = started_state(RecognitionMode::Transcription);

        let effects = step(
            &mut state,
            Event::Engine(EngineEvent::Error(ErrorCode::Network)),
            2_000,
        );
        assert!(emitted(&effects).contains(&&CallbackEvent::Error(ErrorCode::Network)));

        // Second failure in the same episode stays quiet
        let effects = step(
            &mut state,
            Event::Timer(TimerId::Restart),
            2_600,
        );
        assert!(effects.contains(&Effect::StartEngine));
        let effects = step(
            &mut state,
            Event::Engine(EngineEvent::Error(ErrorCode::Network)),
            2_700,
        );
        assert!(!emitted(&effects)
            .iter()
            .any(|cb| matches!(cb, CallbackEvent::Error(_))));
    }

    #[test]
    fn capability_absence_is_terminal_without_retry() {
        let mut state = started_state(RecognitionMode::Transcription);
        let effects = step(
            &mut state,
            Event::EngineFault(ErrorCode::RecognitionUnavailable),
            1_500,
        );

        assert!(emitted(&effects)
            .contains(&&CallbackEvent::Error(ErrorCode::RecognitionUnavailable)));
        assert!(emitted(&effects).contains(&&CallbackEvent::Ended));
        assert!(!state.is_listening);
        assert_eq!(state.status, Status::Error);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::StartTimer(TimerId::Restart, _))));
    }

    #[test]
    fn speech_start_cancels_pending_stop() {
        let mut state = started_state(RecognitionMode::Transcription);
        let effects = step(&mut state, Event::Engine(EngineEvent::SpeechStart), 2_000);
        assert!(effects.contains(&Effect::CancelTimer(TimerId::PendingStop)));
        assert!(emitted(&effects).contains(&&CallbackEvent::SpeechStart));
    }

    #[test]
    fn silence_finalize_vetoed_while_microphone_is_loud() {
        let mut state = started_state(RecognitionMode::Transcription);
        step(
            &mut state,
            Event::Engine(EngineEvent::Result(vec![Fragment::final_text("wait for it")])),
            2_000,
        );
        step(&mut state, Event::Sound(40.0), 2_100);

        // Well past the threshold, but the microphone is hot
        let effects = step(&mut state, Event::Timer(TimerId::Silence), 60_000);
        assert!(emitted(&effects).is_empty(), "loud mic must veto the finalize");
        assert!(!state.buffer.is_empty());
    }

    #[test]
    fn mode_change_while_active_restarts() {
        let mut state = started_state(RecognitionMode::Transcription);
        let effects = step(&mut state, Event::SetMode(RecognitionMode::Realtime), 5_000);

        assert!(effects.contains(&Effect::StopEngine));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartTimer(TimerId::PendingStart, _))));
        assert!(!state.should_stop_after_silence, "realtime does not stop after silence");

        let effects = step(&mut state, Event::Timer(TimerId::PendingStart), 5_300);
        assert!(effects.contains(&Effect::StartEngine));
        assert_eq!(state.mode, RecognitionMode::Realtime);
    }

    #[test]
    fn auto_stop_bounds_transcription_sessions() {
        let mut state = started_state(RecognitionMode::Transcription);
        step(
            &mut state,
            Event::Engine(EngineEvent::Result(vec![Fragment::final_text("marathon")])),
            59_000,
        );

        let effects = step(&mut state, Event::Timer(TimerId::AutoStop), 60_000);
        assert!(emitted(&effects).contains(&&CallbackEvent::Finalize("marathon".into())));
        assert!(emitted(&effects).contains(&&CallbackEvent::Ended));
        assert!(!state.is_listening);
    }

    #[test]
    fn sound_above_threshold_refreshes_speech_time() {
        let mut state = started_state(RecognitionMode::Transcription);
        step(&mut state, Event::Sound(50.0), 7_000);
        assert_eq!(state.last_speech_ms, 7_000);

        // Quiet sample does not refresh
        step(&mut state, Event::Sound(3.0), 8_000);
        assert_eq!(state.last_speech_ms, 7_000);
    }
}
