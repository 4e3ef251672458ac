use std::io::{BufRead, Write};

use crate::error::{PromptTunerError, Result};

pub const THRESHOLD_PROMPT: &str = "What is the threshold for prompt accuracy? (e.g., 0.85): ";

pub fn parse_threshold(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if (0.0..=1.0).contains(&value) => Ok(value),
        _ => Err(PromptTunerError::InvalidThreshold(trimmed.to_string())),
    }
}

/// Asks for a threshold on `output` until `input` supplies a valid one.
pub fn read_threshold<R, W>(input: &mut R, output: &mut W) -> Result<f64>
where
    R: BufRead,
    W: Write,
{
    loop {
        write!(output, "{}", THRESHOLD_PROMPT)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(PromptTunerError::ThresholdInputClosed);
        }

        match parse_threshold(&line) {
            Ok(value) => return Ok(value),
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}
