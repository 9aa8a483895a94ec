//! Executor output interpretation
//!
//! The executor prints lines like `[ 12/340  3s] Compile lib/foo.cpp` and
//! `[BUSY 20s] Link libil2cpp.so`. These become [`ProgressUpdate`]s for the
//! caller's progress sink. Failure output is shortened to a head and tail
//! window before it is reported.

use crate::error::BuildResult;
use regex::Regex;

/// Annotations longer than this lose their directory prefixes
pub const SHORTEN_THRESHOLD: usize = 40;

/// Characters kept from each end of long failure output
pub const OUTPUT_KEEP: usize = 1500;

/// Joins the head and tail of truncated output
pub const SNIP_MARKER: &str = "\n\n>>SNIP<<\n\n";

const COMMAND_BANNER: &str = "##### Command";

/// Progress extracted from one output line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Completed fraction, when the line carried a counter
    pub fraction: Option<f32>,
    pub annotation: String,
}

/// Parser for executor progress lines
#[derive(Debug, Clone)]
pub struct ProgressParser {
    counter: Regex,
    busy: Regex,
}

impl ProgressParser {
    pub fn new() -> BuildResult<Self> {
        Ok(Self {
            counter: Regex::new(r"^\[\s*(\d+)/(\d+) .*\] (.*)$")?,
            busy: Regex::new(r"^\[\s*BUSY.*\] (.*)$")?,
        })
    }

    /// Parse a line; `None` when it carries no progress information
    pub fn parse_line(&self, line: &str) -> Option<ProgressUpdate> {
        if line.trim().is_empty() {
            return None;
        }

        if let Some(caps) = self.counter.captures(line) {
            let done = caps[1].parse::<u64>().ok();
            let total = caps[2].parse::<u64>().ok();
            let fraction = match (done, total) {
                (Some(done), Some(total)) if total > 0 => Some(done as f32 / total as f32),
                _ => None,
            };
            return Some(ProgressUpdate {
                fraction,
                annotation: shorten_annotation(&caps[3]),
            });
        }

        self.busy.captures(line).map(|caps| ProgressUpdate {
            fraction: None,
            annotation: shorten_annotation(&caps[1]),
        })
    }
}

/// Strip directories from each word of a long annotation
pub fn shorten_annotation(annotation: &str) -> String {
    if annotation.chars().count() <= SHORTEN_THRESHOLD {
        return annotation.to_string();
    }
    annotation
        .split(' ')
        .map(|word| match word.rfind('/') {
            Some(slash) => &word[slash + 1..],
            None => word,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shorten failure output to its first and last [`OUTPUT_KEEP`] characters
pub fn truncate_output(output: &str) -> String {
    let output = output
        .strip_prefix(COMMAND_BANNER)
        .unwrap_or(output)
        .trim_start_matches(['\n', '\r']);

    let chars: Vec<char> = output.chars().collect();
    if chars.len() <= OUTPUT_KEEP * 2 {
        return output.to_string();
    }

    let head: String = chars[..OUTPUT_KEEP].iter().collect();
    let tail: String = chars[chars.len() - OUTPUT_KEEP..].iter().collect();
    format!("{}{}{}", head, SNIP_MARKER, tail)
}
