use std::error::Error;
use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::DEFAULT_ASSISTANT_TIMEOUT_SECS;
use crate::domain::ticket::Ticket;

const MAX_CONTEXT_TICKETS: usize = 5;
const MIN_TOKEN_LEN: usize = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub trait TextGenerator {
    fn ask(&self, query: &str, context_blocks: &[String]) -> Result<String, AssistantError>;
}

/// Pipes the assembled prompt to an external program and reads its stdout.
///
/// Stdin is fed from its own thread while stdout and stderr are drained
/// concurrently, so prompts larger than a pipe buffer cannot deadlock. A
/// program still running at the deadline is killed.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(DEFAULT_ASSISTANT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn wait_bounded(&self, child: &mut Child) -> Result<ExitStatus, AssistantError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                if let Err(err) = child.kill() {
                    tracing::warn!(program = %self.program, error = %err, "failed to kill assistant");
                }
                if let Err(err) = child.wait() {
                    tracing::warn!(program = %self.program, error = %err, "failed to reap assistant");
                }
                return Err(AssistantError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl TextGenerator for CommandGenerator {
    fn ask(&self, query: &str, context_blocks: &[String]) -> Result<String, AssistantError> {
        let prompt = build_prompt(query, context_blocks);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| AssistantError::Spawn {
                program: self.program.clone(),
                source: err,
            })?;
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(prompt.as_bytes()) {
                // The program may answer without consuming the whole prompt.
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait_bounded(&mut child)?;
        if let Some(writer) = writer {
            join(writer)?;
        }
        let stdout = stdout.map(join).transpose()?.unwrap_or_default();
        let stderr = stderr.map(join).transpose()?.unwrap_or_default();

        if !status.success() {
            return Err(AssistantError::Failed(
                String::from_utf8_lossy(&stderr).trim().to_string(),
            ));
        }
        let answer = String::from_utf8_lossy(&stdout).trim().to_string();
        if answer.is_empty() {
            return Err(AssistantError::EmptyAnswer);
        }
        Ok(answer)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join<T>(handle: JoinHandle<io::Result<T>>) -> Result<T, AssistantError> {
    handle
        .join()
        .map_err(|_| AssistantError::Io(io::Error::other("assistant pipe thread panicked")))?
        .map_err(AssistantError::Io)
}

pub fn build_prompt(query: &str, context_blocks: &[String]) -> String {
    let mut prompt = String::from(
        "You are a ticket-management assistant. Answer strictly from the context below; \
         if the answer is not there, say you do not have that information. Be concise.\n",
    );
    for block in context_blocks {
        prompt.push_str("---\n");
        prompt.push_str(block.trim_end());
        prompt.push('\n');
    }
    prompt.push_str("---\n");
    prompt.push_str(&format!("Question: \"{}\"\nAnswer:\n", query.trim()));
    prompt
}

/// Summary lines for the most recent tickets whose motive or sheet mentions a query token.
pub fn relevant_ticket_context(tickets: &[Ticket], query: &str) -> String {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return "No relevant tickets found.".to_string();
    }

    let matching: Vec<&Ticket> = tickets
        .iter()
        .filter(|ticket| {
            let motive = ticket.motive.to_lowercase();
            let sheet = ticket.target_sheet.to_lowercase();
            tokens
                .iter()
                .any(|token| motive.contains(token.as_str()) || sheet.contains(token.as_str()))
        })
        .collect();
    if matching.is_empty() {
        return "No relevant tickets found.".to_string();
    }

    let skip = matching.len().saturating_sub(MAX_CONTEXT_TICKETS);
    matching
        .into_iter()
        .skip(skip)
        .map(|ticket| {
            format!(
                "  - Ticket: {}, Motive: \"{}\", Sheet: \"{}\", Status: {}",
                ticket.id, ticket.motive, ticket.target_sheet, ticket.status
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug)]
pub enum AssistantError {
    NotConfigured,
    Spawn {
        program: String,
        source: std::io::Error,
    },
    Io(std::io::Error),
    Failed(String),
    Timeout(Duration),
    EmptyAnswer,
}

impl fmt::Display for AssistantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssistantError::NotConfigured => {
                write!(f, "assistant is not configured; set [assistant] command")
            }
            AssistantError::Spawn { program, source } => {
                write!(f, "failed to start assistant '{}': {}", program, source)
            }
            AssistantError::Io(err) => write!(f, "assistant I/O error: {}", err),
            AssistantError::Failed(stderr) => write!(f, "assistant failed: {}", stderr),
            AssistantError::Timeout(limit) => {
                write!(f, "assistant did not answer within {}s", limit.as_secs_f64())
            }
            AssistantError::EmptyAnswer => write!(f, "assistant returned an empty answer"),
        }
    }
}

impl Error for AssistantError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AssistantError::Spawn { source, .. } => Some(source),
            AssistantError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AssistantError {
    fn from(value: std::io::Error) -> Self {
        AssistantError::Io(value)
    }
}
