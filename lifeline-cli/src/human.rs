//! Terminal human channel.

use async_trait::async_trait;
use lifeline_core::{HumanChannel, InterventionError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Prompts on stderr and reads one line from stdin.
///
/// An empty line declines; `cancel` cancels.
pub struct StdinHumanChannel {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
}

impl StdinHumanChannel {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for StdinHumanChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HumanChannel for StdinHumanChannel {
    async fn prompt(&self, message: &str) -> Result<Option<String>, InterventionError> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(format!("\n{message}\n> ").as_bytes())
            .await
            .map_err(|e| InterventionError::Channel(e.to_string()))?;
        stderr
            .flush()
            .await
            .map_err(|e| InterventionError::Channel(e.to_string()))?;

        let mut line = String::new();
        let read = self
            .stdin
            .lock()
            .await
            .read_line(&mut line)
            .await
            .map_err(|e| InterventionError::Channel(e.to_string()))?;

        interpret(read, &line)
    }
}

fn interpret(read: usize, line: &str) -> Result<Option<String>, InterventionError> {
    let answer = line.trim();
    if read == 0 || answer.is_empty() {
        return Ok(None);
    }
    if answer.eq_ignore_ascii_case("cancel") {
        return Err(InterventionError::Cancelled);
    }
    Ok(Some(answer.to_string()))
}
