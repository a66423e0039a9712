//! Workload files.
//!
//! One process per line: `<size> <addr> <addr> ...`. Numbers are decimal or
//! `0x` hexadecimal, `#` starts a comment, blank lines are skipped.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::process::ProcessSpec;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to read workload file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },

    #[error("workload contains no processes")]
    Empty,
}

pub fn read_workload<P: AsRef<Path>>(path: P) -> Result<Vec<ProcessSpec>, WorkloadError> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_workload(&content)
}

pub fn parse_workload(content: &str) -> Result<Vec<ProcessSpec>, WorkloadError> {
    let mut specs = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default();
        let mut tokens = line.split_whitespace();
        let Some(size) = tokens.next() else {
            continue;
        };

        let size = parse_number(size, idx + 1)?;
        let trace = tokens
            .map(|token| parse_number(token, idx + 1))
            .collect::<Result<Vec<u64>, _>>()?;
        specs.push(ProcessSpec::new(size, trace));
    }

    if specs.is_empty() {
        return Err(WorkloadError::Empty);
    }
    Ok(specs)
}

fn parse_number(token: &str, line: usize) -> Result<u64, WorkloadError> {
    let parsed = match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => token.parse(),
    };
    parsed.map_err(|_| WorkloadError::InvalidNumber {
        line,
        token: token.to_string(),
    })
}
