//! Line-oriented terminal front end
//!
//! Plain lines are appended to the code buffer. Lines starting with `:` are
//! commands mapped onto session and voice operations.

use crate::api::TestCaseResult;
use crate::session::{
    format_clock, ArtifactPatch, EvaluationOutcome, SessionEvent, SessionHandle, SubmitOutcome,
    Termination,
};
use crate::storage::TranscriptExporter;
use crate::voice::{pcm16_chunks, VoiceHandle, VoiceNotice, VoiceState};
use anyhow::Context;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sample rate of raw audio files accepted by `:audio`
const AUDIO_SAMPLE_RATE: u32 = 24_000;
/// 100 ms of audio per websocket frame
const AUDIO_CHUNK_SAMPLES: usize = 2_400;

const HELP: &str = "\
Type code lines to append them to your solution. Commands:
  :run                 run against the visible tests
  :submit              submit (ends the session when all tests pass)
  :giveup              abandon the session
  :talk / :stop        push-to-talk press / release
  :auto on|off         always-listening mode
  :audio PATH          stream a raw PCM16 24 kHz mono file to the interviewer
  :notes TEXT          replace your notes
  :lang LANGUAGE       change the language
  :code                show the current code
  :status              show the clock and counters
  :transcript          print the conversation so far
  :save                export the transcript as Markdown
  :retry-eval          retry a failed evaluation request
  :reconnect           reconnect the voice channel
  :quit                leave (progress is saved)";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConsoleCommand {
    AppendCode(String),
    ShowCode,
    Run,
    Submit,
    GiveUp,
    Talk,
    Stop,
    AlwaysListening(bool),
    Audio(PathBuf),
    Notes(String),
    Language(String),
    Status,
    Transcript,
    Save,
    RetryEvaluation,
    Reconnect,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ParseError {
    #[error("Unknown command :{0} (try :help)")]
    Unknown(String),

    #[error(":{command} needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
}

pub(crate) fn parse_command(line: &str) -> Result<ConsoleCommand, ParseError> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(ConsoleCommand::AppendCode(line.to_string()));
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command.trim(), ""),
    };
    let required = |command, expected| {
        if arg.is_empty() {
            Err(ParseError::MissingArgument { command, expected })
        } else {
            Ok(arg.to_string())
        }
    };

    Ok(match name {
        "run" => ConsoleCommand::Run,
        "submit" => ConsoleCommand::Submit,
        "giveup" | "give-up" => ConsoleCommand::GiveUp,
        "talk" => ConsoleCommand::Talk,
        "stop" => ConsoleCommand::Stop,
        "auto" => match arg {
            "on" => ConsoleCommand::AlwaysListening(true),
            "off" => ConsoleCommand::AlwaysListening(false),
            _ => {
                return Err(ParseError::MissingArgument {
                    command: "auto",
                    expected: "on or off",
                })
            }
        },
        "audio" => ConsoleCommand::Audio(PathBuf::from(required("audio", "a file path")?)),
        "notes" => ConsoleCommand::Notes(required("notes", "some text")?),
        "lang" => ConsoleCommand::Language(required("lang", "a language name")?),
        "code" => ConsoleCommand::ShowCode,
        "status" => ConsoleCommand::Status,
        "transcript" => ConsoleCommand::Transcript,
        "save" => ConsoleCommand::Save,
        "retry-eval" => ConsoleCommand::RetryEvaluation,
        "reconnect" => ConsoleCommand::Reconnect,
        "help" | "h" => ConsoleCommand::Help,
        "quit" | "q" | "exit" => ConsoleCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    })
}

fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_results(results: &[TestCaseResult]) {
    for (i, result) in results.iter().enumerate() {
        let detail = result
            .error
            .as_deref()
            .or(result.actual_output.as_deref())
            .unwrap_or("");
        println!("  test {}: {:?} {}", i + 1, result.status, detail);
    }
}

fn termination_summary(termination: &Termination) -> String {
    let mut summary = format!(
        "Session ended ({}), status: {}, time: {}",
        termination.reason,
        termination.status,
        format_clock(termination.elapsed_seconds)
    );
    match &termination.evaluation {
        EvaluationOutcome::NotRequested => {}
        EvaluationOutcome::Requested { evaluation_id } => {
            summary.push_str(&format!("\nGenerating evaluation {}", evaluation_id))
        }
        EvaluationOutcome::Failed { message } => {
            summary.push_str(&format!("\n{} (type :retry-eval to try again)", message))
        }
    }
    summary
}

/// Console line for a session event. Terminations are only ever printed
/// from here, whichever command or timer caused them.
fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Tick {
            remaining_seconds, ..
        } if *remaining_seconds > 0 && remaining_seconds % 300 == 0 => {
            Some(format!("[{} left]", format_clock(*remaining_seconds)))
        }
        SessionEvent::Tick { .. } | SessionEvent::IntroductionScheduled => None,
        SessionEvent::Ended(termination) => Some(termination_summary(termination)),
    }
}

pub(crate) struct Console {
    session: SessionHandle,
    voice: VoiceHandle,
    exporter: Option<TranscriptExporter>,
    question_title: String,
    code: String,
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    pub(crate) async fn new(
        session: SessionHandle,
        voice: VoiceHandle,
        exporter: Option<TranscriptExporter>,
    ) -> anyhow::Result<Self> {
        let view = session.view().await.context("Session is not running")?;
        println!(
            "{} ({} left{})",
            view.question_title,
            format_clock(view.remaining_seconds),
            if view.resumed { ", resumed" } else { "" }
        );
        println!("Type :help for commands.");
        Ok(Self {
            session,
            voice,
            exporter,
            question_title: view.question_title,
            code: view.artifact.code,
            lines: BufReader::new(tokio::io::stdin()).lines(),
        })
    }

    /// Read commands until `:quit`, end of input or Ctrl-C
    pub(crate) async fn run(mut self) -> anyhow::Result<()> {
        let printer = spawn_printer(&self.session, &self.voice);

        loop {
            let line = tokio::select! {
                line = self.lines.next_line() => line.context("Failed to read stdin")?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };

            match parse_command(&line) {
                Ok(ConsoleCommand::Quit) => break,
                Ok(command) => {
                    if let Err(e) = self.execute(command).await {
                        println!("Error: {:#}", e);
                    }
                }
                Err(e) => println!("{}", e),
            }
        }

        printer.abort();
        Ok(())
    }

    async fn execute(&mut self, command: ConsoleCommand) -> anyhow::Result<()> {
        match command {
            ConsoleCommand::AppendCode(line) => {
                self.code.push_str(&line);
                self.code.push('\n');
                self.session
                    .update_artifact(ArtifactPatch::code(self.code.clone()))
                    .await?;
            }
            ConsoleCommand::ShowCode => println!("{}", self.code),
            ConsoleCommand::Run => {
                let results = self.session.run_code().await?;
                print_results(&results);
            }
            ConsoleCommand::Submit => match self.session.submit().await? {
                SubmitOutcome::Ended { results, .. } => print_results(&results),
                SubmitOutcome::Rejected { results } => {
                    print_results(&results);
                    println!("Not all tests pass yet; keep going.");
                }
            },
            ConsoleCommand::GiveUp => {
                println!("Give up this session? [y/N]");
                let answer = self.lines.next_line().await?.unwrap_or_default();
                if is_confirmation(&answer) {
                    self.session.give_up().await?;
                }
            }
            ConsoleCommand::Talk => self.voice.start_listening().await?,
            ConsoleCommand::Stop => self.voice.stop_listening().await?,
            ConsoleCommand::AlwaysListening(true) => self.voice.enable_always_listening().await?,
            ConsoleCommand::AlwaysListening(false) => {
                self.voice.disable_always_listening().await?
            }
            ConsoleCommand::Audio(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {:?}", path))?;
                let chunks = pcm16_chunks(&bytes, AUDIO_SAMPLE_RATE, AUDIO_CHUNK_SAMPLES);
                debug!(chunks = chunks.len(), "Streaming audio file");
                for chunk in chunks {
                    self.voice.send_audio(chunk).await?;
                }
            }
            ConsoleCommand::Notes(notes) => {
                self.session
                    .update_artifact(ArtifactPatch::notes(notes))
                    .await?
            }
            ConsoleCommand::Language(language) => {
                self.session
                    .update_artifact(ArtifactPatch::language(language))
                    .await?
            }
            ConsoleCommand::Status => {
                let view = self.session.view().await?;
                println!(
                    "{} | {} elapsed, {} left | runs: {} submits: {} | voice: {}",
                    view.status,
                    format_clock(view.elapsed_seconds),
                    format_clock(view.remaining_seconds),
                    view.run_count,
                    view.submit_count,
                    view.voice_state
                );
                if let Some(partial) = view.user_partial {
                    println!("(hearing: {})", partial);
                }
            }
            ConsoleCommand::Transcript => {
                for entry in self.session.transcript().await? {
                    println!("{}: {}", entry.speaker, entry.text);
                }
            }
            ConsoleCommand::Save => {
                let exporter = self
                    .exporter
                    .as_ref()
                    .context("No transcript directory available")?;
                let entries = self.session.transcript().await?;
                let path =
                    exporter.save(self.session.session_id(), &self.question_title, &entries)?;
                println!("Saved transcript to {}", path.display());
            }
            ConsoleCommand::RetryEvaluation => {
                let evaluation_id = self.session.retry_evaluation().await?;
                println!("Generating evaluation {}", evaluation_id);
            }
            ConsoleCommand::Reconnect => self.voice.reconnect().await?,
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }
}

/// Print session and voice events as they happen
fn spawn_printer(session: &SessionHandle, voice: &VoiceHandle) -> JoinHandle<()> {
    let mut events = session.subscribe();
    let mut notices = voice.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Some(line) = describe_event(&event) {
                            println!("{}", line);
                        }
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
                notice = notices.recv() => match notice {
                    Ok(VoiceNotice::Transcript(update)) if update.is_final => {
                        println!("{}: {}", update.speaker, update.text.trim());
                    }
                    Ok(VoiceNotice::State(VoiceState::Error)) => println!("[voice] connection lost"),
                    Ok(VoiceNotice::Reconnecting { attempt }) => {
                        println!("[voice] reconnecting (attempt {})", attempt)
                    }
                    Ok(VoiceNotice::Reconnected) => println!("[voice] reconnected"),
                    Ok(VoiceNotice::ReconnectFailed) => {
                        println!("[voice] could not reconnect, type :reconnect to retry")
                    }
                    Ok(VoiceNotice::Error { message }) => warn!("Voice error: {}", message),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Printer lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}
