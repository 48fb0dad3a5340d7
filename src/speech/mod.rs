use std::process::{Command, Stdio};

use thiserror::Error;

pub const DEFAULT_SPEECH_COMMAND: &str = "spd-say";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("nothing to speak")]
    EmptyText,
    #[error("command io error: {command}")]
    CommandIo {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command failed: {command}: {message}")]
    CommandFailed { command: String, message: String },
}

pub type SpeechResult<T> = std::result::Result<T, SpeechError>;

/// Called exactly once when an utterance ends, successfully or not.
pub type SpeechCallback = Box<dyn FnOnce(SpeechResult<()>) + Send + 'static>;

/// Fire-and-forget speech synthesis.
pub trait SpeechOutput {
    /// Starts speaking `text`. An `Err` means the utterance never started and
    /// `on_finished` will not be called.
    fn speak(&self, text: &str, on_finished: SpeechCallback) -> SpeechResult<()>;
}

/// Speaks through an external command that blocks until playback ends
/// (`spd-say --wait` by default).
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let args = if program == DEFAULT_SPEECH_COMMAND {
            vec!["--wait".to_string()]
        } else {
            Vec::new()
        };
        Self { program, args }
    }

    pub fn with_args(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for CommandSpeech {
    fn default() -> Self {
        Self::new(DEFAULT_SPEECH_COMMAND)
    }
}

impl CommandSpeech {
    // `--` keeps recognized text such as "-5 ARMOR" from being read as a flag.
    fn command(&self, text: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg("--").arg(text);
        command
    }
}

impl SpeechOutput for CommandSpeech {
    fn speak(&self, text: &str, on_finished: SpeechCallback) -> SpeechResult<()> {
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let mut child = self
            .command(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SpeechError::CommandIo {
                command: self.program.clone(),
                source,
            })?;
        tracing::debug!(command = %self.program, chars = text.chars().count(), "speaking");

        let program = self.program.clone();
        std::thread::spawn(move || {
            let result = match child.wait_with_output() {
                Ok(output) if output.status.success() => Ok(()),
                Ok(output) => Err(SpeechError::CommandFailed {
                    command: program,
                    message: format!(
                        "exit status: {}; stderr: {}",
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                }),
                Err(source) => Err(SpeechError::CommandIo {
                    command: program,
                    source,
                }),
            };
            on_finished(result);
        });
        Ok(())
    }
}
