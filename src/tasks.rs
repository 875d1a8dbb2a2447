use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use itertools::Itertools;
use thiserror::Error;
use tracing::debug;

/// An inclusive or exclusive integer progression with the textual forms `a`,
/// `a..b`, `a..<b`, each optionally followed by `step k`.
///
/// ```
/// use raben::tasks::IntRange;
///
/// let range: IntRange = "23 .. < 42 step 5".parse().unwrap();
/// assert_eq!(range.values(), vec![23, 28, 33, 38]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntRange {
    start: i64,
    end: i64,
    inclusive: bool,
    step: i64,
}

/// Raised for malformed range syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid range `{input}`: {reason}")]
pub struct RangeParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl IntRange {
    /// A range holding a single value.
    pub fn singleton(value: i64) -> Self {
        Self { start: value, end: value, inclusive: true, step: 1 }
    }

    /// The values of the progression, in ascending order.
    pub fn values(&self) -> Vec<i64> {
        let mut values = Vec::new();
        let mut current = self.start;
        while current < self.end || (self.inclusive && current == self.end) {
            values.push(current);
            current += self.step;
        }
        values
    }
}

impl FromStr for IntRange {
    type Err = RangeParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| RangeParseError {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let int = |raw: &str| raw.trim().parse::<i64>().map_err(|_| fail("expected an integer"));

        let trimmed = input.trim();
        let (range_part, step) = match trimmed.find("step") {
            Some(at) => (&trimmed[..at], int(&trimmed[at + "step".len()..])?),
            None => (trimmed, 1),
        };
        if step < 1 {
            return Err(fail("step must be positive"));
        }

        match range_part.split_once("..") {
            None => Ok(Self { step, ..Self::singleton(int(range_part)?) }),
            Some((start, end)) => {
                let start = int(start)?;
                let end = end.trim();
                let (inclusive, end) = match end.strip_prefix('<') {
                    Some(rest) => (false, int(rest)?),
                    None => (true, int(end)?),
                };
                Ok(Self { start, end, inclusive, step })
            }
        }
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end && self.inclusive {
            write!(f, "{}", self.start)?;
        } else {
            write!(f, "{}..{}{}", self.start, if self.inclusive { "" } else { "<" }, self.end)?;
        }
        if self.step != 1 {
            write!(f, " step {}", self.step)?;
        }
        Ok(())
    }
}

/// The output path of a generation task: one directory level per parameter,
/// and a file name joining all parameters with the seed.
pub fn output_path(directory: &Path, parameters: &[i64], seed: u64) -> PathBuf {
    let mut path = directory.to_path_buf();
    for parameter in parameters {
        path.push(parameter.to_string());
    }
    let stem = parameters
        .iter()
        .map(i64::to_string)
        .chain(std::iter::once(seed.to_string()))
        .join("_");
    path.push(format!("{stem}.xml"));
    path
}

/// Writes `contents` to `path` atomically: the bytes go to a pid-tagged
/// sibling first, which is then renamed over the target, so a cancelled task
/// leaves no partial file. Returns `false` without touching anything when the
/// target exists and `force` is not set.
pub fn write_atomic(path: &Path, contents: &str, force: bool) -> io::Result<bool> {
    if path.exists() && !force {
        debug!("skipping existing `{}`", path.display());
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let temp = path.with_file_name(format!(
        "~{}.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));
    fs::write(&temp, contents)?;
    fs::rename(&temp, path)?;
    debug!("wrote `{}`", path.display());
    Ok(true)
}
