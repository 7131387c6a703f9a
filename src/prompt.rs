use std::io::{BufRead, Write};

use crate::error::{AppError, Result};

/// Empty input means "no value"; anything else must be a non-negative integer.
pub fn parse_optional_number(input: &str) -> Result<Option<u64>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| AppError::Prompt(format!("expected a number, got '{trimmed}'")))
}

/// Print `label`, then read one line from `input`.
pub fn ask<R: BufRead, W: Write>(label: &str, input: &mut R, output: &mut W) -> Result<Option<u64>> {
    write!(output, "{label}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    parse_optional_number(&line)
}

/// Ask on the terminal.
pub fn ask_stdin(label: &str) -> Result<Option<u64>> {
    let stdin = std::io::stdin();
    ask(label, &mut stdin.lock(), &mut std::io::stdout())
}
