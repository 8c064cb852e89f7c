//! The per-call dialogue state machine.
//!
//! One [`CallSession`] drives one call from answer to hangup: record the
//! caller, transcribe, decide whether to keep going, generate a reply,
//! synthesize it, play it back. Provider failures degrade into
//! reprompts or a fixed fallback so the caller never gets dead air; only a
//! broken control channel aborts the call, and even then the hangup command
//! is still attempted exactly once.

use tracing::{debug, error, info, warn};

use crate::TurnRecord;
use crate::agi::{AgiEnv, CallControl, ChannelError};
use crate::artifacts::{ArtifactError, ArtifactKind, ArtifactStore};
use crate::chat::ChatAgent;
use crate::config::Config;
use crate::speech::{Synthesizer, Transcriber};

// Spoken in place of a reply when the language model call fails.
const FALLBACK_REPLY: &str = "Извините, произошла ошибка при обработке запроса.";

// DTMF key that stops a recording early.
const RECORD_ESCAPE_DIGITS: &str = "#";

#[derive(Debug, PartialEq)]
pub enum CallState {
    Greeting,
    Listening,
    Deciding,
    Replying,
    Speaking,
    Closing,
    Closed,
}

pub struct CallSession<C: CallControl> {
    pub state: CallState,
    channel: C,
    agent: Box<dyn ChatAgent>,
    transcriber: Box<dyn Transcriber>,
    synthesizer: Box<dyn Synthesizer>,
    artifacts: ArtifactStore,
    config: Config,
    caller_id: String,
    call_id: String,
    history: Vec<TurnRecord>,
    turn: u32,
    pending_utterance: Option<String>,
    pending_reply: Option<String>,
}

impl<C: CallControl> CallSession<C> {
    /// Builds the session for one incoming call. The artifact store is rooted
    /// at the configured temporary directory and namespaced by the call
    /// identifier the host assigned (or a pid-derived one when absent, so two
    /// simultaneous unidentified calls cannot collide).
    pub fn new(
        channel: C,
        agent: Box<dyn ChatAgent>,
        transcriber: Box<dyn Transcriber>,
        synthesizer: Box<dyn Synthesizer>,
        config: Config,
        env: &AgiEnv,
    ) -> Result<Self, ArtifactError> {
        let caller_id = env.caller_id().to_string();
        let call_id = env
            .unique_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("unknown-{}", std::process::id()));
        let artifacts = ArtifactStore::new(config.tmp_dir.clone(), call_id.clone())?;

        info!("New call from {caller_id}, ID: {call_id}");

        Ok(Self {
            state: CallState::Greeting,
            channel,
            agent,
            transcriber,
            synthesizer,
            artifacts,
            config,
            caller_id,
            call_id,
            history: Vec::new(),
            turn: 0,
            pending_utterance: None,
            pending_reply: None,
        })
    }

    /// Answers the channel and runs the call to completion. Whatever happens
    /// after that, the hangup command is issued exactly once before this
    /// returns; a channel error aborts the dialogue and is returned after
    /// that hangup attempt.
    pub async fn run(&mut self) -> Result<(), ChannelError> {
        let outcome = self.dialogue().await;

        if let Err(e) = &outcome {
            error!("Call handling error: {e}");
            // Best effort. If the channel is already gone this fails silently.
            let apology = self.config.apology_text.clone();
            if let Err(speak_err) = self.speak(&apology).await {
                debug!("Apology playback failed: {speak_err}");
            }
        }

        match self.channel.hangup().await {
            Ok(_) => info!("Call {} hung up", self.call_id),
            Err(e) => {
                if outcome.is_ok() {
                    return Err(e);
                }
                debug!("Hangup failed after call error: {e}");
            }
        }
        outcome
    }

    async fn dialogue(&mut self) -> Result<(), ChannelError> {
        self.channel.answer().await?;
        self.channel.verbose("Starting AI call handler", 3).await?;

        loop {
            match self.state {
                CallState::Greeting => {
                    let greeting = self.config.greeting_text.clone();
                    self.speak(&greeting).await?;
                    self.state = CallState::Listening;
                }
                CallState::Listening => {
                    if self.turn >= self.config.max_turns {
                        info!("Turn limit reached ({})", self.config.max_turns);
                        self.state = CallState::Closing;
                        continue;
                    }
                    self.turn += 1;
                    info!(
                        "Conversation turn {}/{} with {}",
                        self.turn, self.config.max_turns, self.caller_id
                    );

                    let text = self.listen().await?;
                    if text.is_empty() {
                        warn!("No input from user");
                        if !self.config.count_empty_turns {
                            self.turn -= 1;
                        }
                        if self.turn >= self.config.max_turns {
                            self.state = CallState::Closing;
                        } else {
                            let reprompt = self.config.reprompt_text.clone();
                            self.speak(&reprompt).await?;
                        }
                    } else {
                        info!("User said: {text}");
                        self.pending_utterance = Some(text);
                        self.state = CallState::Deciding;
                    }
                }
                CallState::Deciding => {
                    let text = self.pending_utterance.as_deref().unwrap_or_default();
                    if self.wants_to_hang_up(text) {
                        info!("Exit phrase detected");
                        self.pending_utterance = None;
                        self.state = CallState::Closing;
                    } else {
                        self.state = CallState::Replying;
                    }
                }
                CallState::Replying => {
                    let utterance = self.pending_utterance.take().unwrap_or_default();
                    let reply = match self.agent.reply(&utterance, &self.history).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            error!("AI error: {e:#}");
                            FALLBACK_REPLY.to_string()
                        }
                    };
                    info!("AI response: {reply}");
                    self.history.push(TurnRecord::user(utterance));
                    self.history.push(TurnRecord::assistant(reply.clone()));
                    self.pending_reply = Some(reply);
                    self.state = CallState::Speaking;
                }
                CallState::Speaking => {
                    let reply = self.pending_reply.take().unwrap_or_default();
                    self.speak(&reply).await?;
                    self.state = if self.turn >= self.config.max_turns {
                        CallState::Closing
                    } else {
                        CallState::Listening
                    };
                }
                CallState::Closing => {
                    let farewell = self.config.farewell_text.clone();
                    if let Err(e) = self.speak(&farewell).await {
                        warn!("Farewell playback failed: {e}");
                    }
                    self.state = CallState::Closed;
                }
                CallState::Closed => return Ok(()),
            }
        }
    }

    /// Record one caller segment and transcribe it. Recognition failures are
    /// logged and reported as empty text so the loop can reprompt instead of
    /// dropping the call. The recording artifact is gone by the time this
    /// returns, on every path.
    async fn listen(&mut self) -> Result<String, ChannelError> {
        let artifact = self.artifacts.turn_artifact(ArtifactKind::Recording, self.turn);
        let base = artifact.base().to_string_lossy();

        self.channel
            .record_file(
                base.as_ref(),
                "wav",
                RECORD_ESCAPE_DIGITS,
                self.config.listen_timeout_secs.saturating_mul(1000),
                false,
                self.config.record_silence_secs,
            )
            .await?;

        // The host appends the format extension to the path it was given.
        let recording = artifact.derived("wav");
        let text = match self.transcriber.transcribe(&recording).await {
            Ok(text) => text,
            Err(e) => {
                error!("STT error: {e:#}");
                String::new()
            }
        };

        if self.config.enable_recording {
            match self.artifacts.archive_recording(
                &recording,
                &self.config.recordings_dir,
                self.turn,
            ) {
                Ok(dest) => debug!("Archived caller audio to {}", dest.display()),
                Err(e) => warn!("Failed to archive recording: {e}"),
            }
        }

        Ok(text.trim().to_string())
    }

    /// Synthesize and play one utterance. Synthesis failures are logged and
    /// swallowed (the turn just goes unspoken); playback failures are channel
    /// errors and propagate.
    async fn speak(&mut self, text: &str) -> Result<(), ChannelError> {
        debug!("Speaking: {text}");
        let artifact = self.artifacts.turn_artifact(ArtifactKind::Speech, self.turn);
        let target = artifact.derived("ul");

        match self.synthesizer.synthesize(text, &target).await {
            Ok(()) => {
                let base = artifact.base().to_string_lossy();
                self.channel.stream_file(base.as_ref(), "").await?;
            }
            Err(e) => error!("Failed to generate speech: {e:#}"),
        }
        Ok(())
    }

    fn wants_to_hang_up(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.config
            .exit_phrases
            .iter()
            .any(|phrase| lowered.contains(phrase))
    }
}
