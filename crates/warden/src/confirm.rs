//! Interactive confirmation
//!
//! The gate never prompts by itself. Hosts inject a [`Confirmer`] that asks
//! the user and answers `Some(true)` (approve), `Some(false)` (reject) or
//! `None` (dismissed).

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Asks the user whether a command may run
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, command: &str, reason: &str) -> Result<Option<bool>>;
}

/// Always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub Option<bool>);

#[async_trait]
impl Confirmer for FixedAnswer {
    async fn confirm(&self, _command: &str, _reason: &str) -> Result<Option<bool>> {
        Ok(self.0)
    }
}

/// Prompts on stderr and reads `y`/`n` from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, command: &str, reason: &str) -> Result<Option<bool>> {
        let mut stderr = tokio::io::stderr();
        let prompt = format!("{}\n  $ {}\nRun it? [y/N] ", reason, command);
        stderr
            .write_all(prompt.as_bytes())
            .await
            .context("Failed to write confirmation prompt")?;
        stderr.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("Failed to read confirmation answer")?;
        if read == 0 {
            return Ok(None);
        }

        Ok(parse_answer(&line))
    }
}

/// Interpret a typed answer; anything unrecognized counts as dismissed
fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), Some(true));
        assert_eq!(parse_answer("YES"), Some(true));
        assert_eq!(parse_answer("\n"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[tokio::test]
    async fn test_fixed_answer() {
        let confirmer = FixedAnswer(Some(false));
        assert_eq!(confirmer.confirm("rm -rf build", "Recursive delete").await.unwrap(), Some(false));
    }
}
