//! Probe Identity
//!
//! Every cycle probes a fresh object named `<prefix>-<token>.<ext>`, where
//! the token is the launch time in unix seconds. When more than one identity
//! is issued within the same second the token becomes `<secs>-<seq>`.
//!
//! The local staging file for the downloaded copy is derived from the
//! identity alone (`output-<token>.<ext>`); nothing else carries that
//! mapping, so the two formats must stay in lockstep.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Prefix of staging filenames
pub const STAGING_PREFIX: &str = "output";

/// Identity parsing and construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid probe identity '{0}': expected <prefix>-<timestamp>.<ext>")]
    Malformed(String),

    #[error("Invalid timestamp segment '{0}'")]
    InvalidTimestamp(String),

    #[error("Invalid object prefix '{0}': must be non-empty and contain no '-', '.' or '/'")]
    InvalidPrefix(String),

    #[error("Invalid object extension '{0}': must be non-empty and contain no '-', '.' or '/'")]
    InvalidExtension(String),
}

/// Name of the object probed by one cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeIdentity {
    name: String,
    prefix: String,
    token: String,
    extension: String,
}

impl ProbeIdentity {
    /// Parse an object name of the form `<prefix>-<secs>[-<seq>].<ext>`
    pub fn parse(name: &str) -> Result<Self, IdentityError> {
        let malformed = || IdentityError::Malformed(name.to_string());

        let (stem, extension) = name.rsplit_once('.').ok_or_else(malformed)?;
        let (prefix, token) = stem.split_once('-').ok_or_else(malformed)?;

        validate_segment(prefix).map_err(|_| IdentityError::InvalidPrefix(prefix.to_string()))?;
        validate_segment(extension)
            .map_err(|_| IdentityError::InvalidExtension(extension.to_string()))?;
        validate_token(token)?;

        Ok(Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            token: token.to_string(),
            extension: extension.to_string(),
        })
    }

    /// Full object name
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Object prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object extension (without the dot)
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Timestamp segment, including any same-second sequence suffix
    pub fn timestamp_token(&self) -> &str {
        &self.token
    }

    /// Launch time in unix seconds
    pub fn unix_seconds(&self) -> i64 {
        let secs = self
            .token
            .split_once('-')
            .map_or(self.token.as_str(), |(secs, _)| secs);
        // validate_token guarantees the digits parse
        secs.parse().unwrap_or_default()
    }

    /// Staging filename for the downloaded copy
    pub fn staging_file_name(&self) -> String {
        format!("{}-{}.{}", STAGING_PREFIX, self.token, self.extension)
    }

    /// Staging path under `dir`
    pub fn staging_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.staging_file_name())
    }
}

impl fmt::Display for ProbeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for ProbeIdentity {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

fn validate_segment(segment: &str) -> Result<(), ()> {
    if segment.is_empty() || segment.contains(['-', '.', '/', '\\']) {
        return Err(());
    }
    Ok(())
}

fn validate_token(token: &str) -> Result<(), IdentityError> {
    let invalid = || IdentityError::InvalidTimestamp(token.to_string());
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    let (secs, seq) = match token.split_once('-') {
        Some((secs, seq)) => (secs, Some(seq)),
        None => (token, None),
    };

    if !all_digits(secs) || secs.parse::<i64>().is_err() {
        return Err(invalid());
    }
    if let Some(seq) = seq {
        if !all_digits(seq) {
            return Err(invalid());
        }
    }
    Ok(())
}

#[derive(Debug)]
struct GeneratorState {
    secs: i64,
    seq: u64,
}

/// Issues unique probe identities
///
/// The timestamp never moves backwards: if the wall clock steps back, new
/// identities stay on the last issued second and bump the sequence instead.
#[derive(Debug)]
pub struct IdentityGenerator {
    prefix: String,
    extension: String,
    state: Mutex<GeneratorState>,
}

impl IdentityGenerator {
    /// Create a generator for `<prefix>-...<ext>` names
    pub fn new(prefix: &str, extension: &str) -> Result<Self, IdentityError> {
        validate_segment(prefix).map_err(|_| IdentityError::InvalidPrefix(prefix.to_string()))?;
        validate_segment(extension)
            .map_err(|_| IdentityError::InvalidExtension(extension.to_string()))?;

        Ok(Self {
            prefix: prefix.to_string(),
            extension: extension.to_string(),
            state: Mutex::new(GeneratorState {
                secs: i64::MIN,
                seq: 0,
            }),
        })
    }

    /// Next identity for the current wall-clock second
    pub fn next(&self) -> ProbeIdentity {
        self.next_at(chrono::Utc::now().timestamp())
    }

    /// Next identity for `unix_secs`
    pub fn next_at(&self, unix_secs: i64) -> ProbeIdentity {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if unix_secs > state.secs {
            state.secs = unix_secs;
            state.seq = 0;
        } else {
            state.seq += 1;
        }

        let token = if state.seq == 0 {
            state.secs.to_string()
        } else {
            format!("{}-{}", state.secs, state.seq)
        };

        ProbeIdentity {
            name: format!("{}-{}.{}", self.prefix, token, self.extension),
            prefix: self.prefix.clone(),
            token,
            extension: self.extension.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_plain_identity() {
        let identity = ProbeIdentity::parse("test-1700000000.jpg").unwrap();
        assert_eq!(identity.prefix(), "test");
        assert_eq!(identity.extension(), "jpg");
        assert_eq!(identity.timestamp_token(), "1700000000");
        assert_eq!(identity.unix_seconds(), 1_700_000_000);
        assert_eq!(identity.staging_file_name(), "output-1700000000.jpg");
    }

    #[test]
    fn test_parse_sequenced_identity() {
        let identity = ProbeIdentity::parse("test-1700000000-2.jpg").unwrap();
        assert_eq!(identity.timestamp_token(), "1700000000-2");
        assert_eq!(identity.unix_seconds(), 1_700_000_000);
        assert_eq!(identity.staging_file_name(), "output-1700000000-2.jpg");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            ProbeIdentity::parse("test1700000000.jpg"),
            Err(IdentityError::Malformed(_))
        ));
        assert!(matches!(
            ProbeIdentity::parse("test-1700000000"),
            Err(IdentityError::Malformed(_))
        ));
        assert!(matches!(
            ProbeIdentity::parse("test-abc.jpg"),
            Err(IdentityError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            ProbeIdentity::parse("test-1700000000-.jpg"),
            Err(IdentityError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            ProbeIdentity::parse("-1700000000.jpg"),
            Err(IdentityError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_parse_rejects_path_segments() {
        assert!(ProbeIdentity::parse("test-../../etc.jpg").is_err());
        assert!(ProbeIdentity::parse("test-1/2.jpg").is_err());
    }

    #[test]
    fn test_staging_path_joins_dir() {
        let identity = ProbeIdentity::parse("test-1700000000.jpg").unwrap();
        let path = identity.staging_path(Path::new("/tmp/probe"));
        assert_eq!(path, PathBuf::from("/tmp/probe/output-1700000000.jpg"));
    }

    #[test]
    fn test_generator_plain_name_per_second() {
        let generator = IdentityGenerator::new("test", "jpg").unwrap();
        let first = generator.next_at(1_700_000_000);
        let second = generator.next_at(1_700_000_010);

        assert_eq!(first.as_str(), "test-1700000000.jpg");
        assert_eq!(second.as_str(), "test-1700000010.jpg");
    }

    #[test]
    fn test_generator_same_second_is_unique() {
        let generator = IdentityGenerator::new("test", "jpg").unwrap();
        let names: Vec<_> = (0..5).map(|_| generator.next_at(1_700_000_000)).collect();

        assert_eq!(names[0].as_str(), "test-1700000000.jpg");
        assert_eq!(names[1].as_str(), "test-1700000000-1.jpg");

        let unique: HashSet<_> = names.iter().map(|i| i.as_str().to_string()).collect();
        assert_eq!(unique.len(), 5);
        let staging: HashSet<_> = names.iter().map(|i| i.staging_file_name()).collect();
        assert_eq!(staging.len(), 5);
    }

    #[test]
    fn test_generator_clock_step_back() {
        let generator = IdentityGenerator::new("test", "jpg").unwrap();
        let first = generator.next_at(1_700_000_010);
        let second = generator.next_at(1_700_000_000);

        assert_ne!(first, second);
        assert_eq!(second.as_str(), "test-1700000010-1.jpg");
    }

    #[test]
    fn test_generated_identity_round_trips_through_parse() {
        let generator = IdentityGenerator::new("probe", "bin").unwrap();
        generator.next_at(42);
        let identity = generator.next_at(42);

        let parsed = ProbeIdentity::parse(identity.as_str()).unwrap();
        assert_eq!(parsed, identity);
    }

    #[test]
    fn test_generator_rejects_bad_segments() {
        assert!(matches!(
            IdentityGenerator::new("my-probe", "jpg"),
            Err(IdentityError::InvalidPrefix(_))
        ));
        assert!(matches!(
            IdentityGenerator::new("probe", ".jpg"),
            Err(IdentityError::InvalidExtension(_))
        ));
    }
}
