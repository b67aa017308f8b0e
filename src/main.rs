use anyhow::{Context, Result};
use clap::Parser;
use live_assist::{
    AnswerClient, Config, FrameSource, LiveSession, QuestionTrigger, SessionConfig, SessionEvent,
    SessionState, WavFileSource, WsConnector,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "live-assist", about = "Live transcription with streamed answers")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "config/live-assist")]
    config: String,

    /// WAV file streamed as the audio source
    #[arg(long)]
    input: PathBuf,

    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Deadline for the setup acknowledgement, in seconds
    #[arg(long, default_value_t = 30)]
    setup_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    let api_key = cfg
        .provider
        .resolved_api_key()
        .context("No API key: set GEMINI_API_KEY or provider.api_key in the config")?;

    let session_config = SessionConfig {
        model: cfg.provider.model.clone(),
        system_instruction: cfg.provider.system_instruction.clone(),
        ..Default::default()
    };

    let connector = WsConnector::new(cfg.provider.live_endpoint(&api_key));
    let session = Arc::new(LiveSession::new(session_config, Box::new(connector)));

    session.connect().await?;
    session
        .wait_for_setup_complete(Duration::from_secs(cli.setup_timeout_secs))
        .await?;
    info!("Session ready, streaming {}", cli.input.display());

    let trigger = Arc::new(QuestionTrigger::new());
    trigger.reset();

    let answers = Arc::new(AnswerClient::new(
        cfg.provider.answer_url.clone(),
        api_key,
        cfg.provider.answer_model.clone(),
        cfg.provider.answer_instruction.clone(),
    ));

    // Event consumer: render the transcript, dispatch answers for questions
    let mut events = session.subscribe();
    let session_token = session.cancellation_token();
    let event_task = tokio::spawn({
        let trigger = Arc::clone(&trigger);
        let answers = Arc::clone(&answers);
        async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Event subscriber lagged, dropped {} events", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match event {
                    SessionEvent::InputTranscriptChunk(text) => {
                        print!("{}", text);
                        std::io::stdout().flush().ok();
                    }
                    SessionEvent::ModelOutput(text) => {
                        print!("{}", text);
                        std::io::stdout().flush().ok();
                    }
                    SessionEvent::TurnComplete(record) => {
                        if record.is_empty() {
                            continue;
                        }
                        println!();

                        if let Some(question) = trigger.observe_turn(&record.text) {
                            info!("Question detected: {}", question);
                            let answers = Arc::clone(&answers);
                            let token = session_token.child_token();
                            tokio::spawn(async move {
                                println!("\n--- {} ---", question);
                                let outcome = answers
                                    .stream_answer(
                                        &question,
                                        |chunk| {
                                            print!("{}", chunk);
                                            std::io::stdout().flush().ok();
                                        },
                                        token,
                                    )
                                    .await;
                                match outcome {
                                    Ok(_) => println!("\n--- end of answer ---"),
                                    Err(e) => warn!("Answer stream failed: {}", e),
                                }
                            });
                        }
                    }
                    SessionEvent::Closed(reason) => {
                        if let Some(reason) = reason {
                            error!("Session closed: {}", reason);
                        }
                        break;
                    }
                }
            }
        }
    });

    // Frame pump at the capture cadence
    let mut source = WavFileSource::open(&cli.input, cfg.audio.frame_duration_ms)?;
    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.audio.frame_duration_ms));
    let limit = cli.duration_secs.map(Duration::from_secs);
    let started = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if limit.is_some_and(|limit| started.elapsed() >= limit) {
                    info!("Duration limit reached");
                    break;
                }
                if session.state() == SessionState::Closed {
                    error!(
                        "Session closed: {}",
                        session.last_server_error().unwrap_or_else(|| "unknown".into())
                    );
                    break;
                }
                match source.next_frame().await {
                    Ok(Some(frame)) => session.send_audio(&frame).await,
                    Ok(None) => {
                        info!("Audio source exhausted");
                        break;
                    }
                    Err(e) => {
                        error!("Frame source failed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    session.disconnect().await;
    let _ = event_task.await;

    let stats = session.stats();
    info!(
        "Session finished: {} frames sent, {} turns, {} reconnects",
        stats.frames_sent, stats.turns_completed, stats.reconnects
    );

    Ok(())
}
