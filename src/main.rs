use anyhow::Result;
use clap::Parser;
use lingua_listen::{
    RecognitionMode, ScriptedProvider, SessionCallbacks, SessionConfig, SpeechSession,
    SyntheticLevelProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Replay a scripted recognition session and print what the session
/// manager makes of it
#[derive(Parser, Debug)]
#[command(name = "lingua-listen", about = "Speech-recognition session demo")]
struct Args {
    /// Configuration file (optional; defaults apply when absent)
    #[arg(short, long)]
    config: Option<String>,

    /// Operating mode: realtime or transcription
    #[arg(short, long, default_value = "transcription")]
    mode: String,

    /// Phrases the scripted engine will "hear", one utterance each
    #[arg(default_values_t = [
        "I want to practice speaking".to_string(),
        "how do you say good morning".to_string(),
    ])]
    phrases: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    config.recognition.mode = match args.mode.as_str() {
        "realtime" => RecognitionMode::Realtime,
        _ => RecognitionMode::Transcription,
    };

    // Snappier timing than the browser defaults so the demo wraps up quickly
    config.timing.initial_silence_threshold = Duration::from_secs(2);
    config.timing.min_silence_threshold = Duration::from_secs(1);
    config.timing.silence_debounce = Duration::from_millis(500);
    config.timing.pending_stop_grace = Duration::from_millis(500);

    info!(session = %config.session_id, mode = ?config.recognition.mode, "lingua-listen demo");

    let phrases: Vec<&str> = args.phrases.iter().map(String::as_str).collect();
    let recognition = Arc::new(ScriptedProvider::from_phrases(&phrases, Duration::from_millis(400)));
    let sound = Arc::new(SyntheticLevelProvider::quiet());

    let session = SpeechSession::new(config, recognition, sound);

    let ended = Arc::new(tokio::sync::Notify::new());
    let ended_tx = Arc::clone(&ended);
    session.set_callbacks(
        SessionCallbacks::new()
            .on_result(|text, is_final| println!("  result ({}): {text}", if is_final { "final" } else { "interim" }))
            .on_finalize_transcript(|text| println!("utterance: {text}"))
            .on_no_speech(|| println!("  (no speech)"))
            .on_silence(|| println!("  (silence)"))
            .on_error(|code| eprintln!("error: {code}"))
            .on_end(move || ended_tx.notify_one()),
    );

    session.start();

    tokio::select! {
        _ = ended.notified() => info!("Session ended"),
        _ = tokio::time::sleep(Duration::from_secs(90)) => {
            info!("Demo timeout reached, stopping");
            session.stop();
        }
    }

    let stats = session.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    session.shutdown();

    Ok(())
}
