//! Classification of source-process exits.
//!
//! | exit                                               | verdict             |
//! |----------------------------------------------------|---------------------|
//! | code 0                                             | `CleanCompletion`   |
//! | non-zero, alive < window, resume offset > 0        | `FastCrashOnSeek`   |
//! | anything else (including death by signal)          | `HardFailure`       |

use std::time::Duration;

use serde::Serialize;

/// What a source exit means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitVerdict {
    /// The asset was fully downloaded; let the transform drain.
    CleanCompletion,
    /// The downloader died right after being asked to seek. Retry from the live edge.
    FastCrashOnSeek,
    /// Anything else. The session ends.
    HardFailure,
}

impl std::fmt::Display for ExitVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CleanCompletion => "clean completion",
            Self::FastCrashOnSeek => "fast crash on seek",
            Self::HardFailure => "hard failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExitClassifier {
    fast_crash_window: Duration,
}

impl ExitClassifier {
    pub fn new(fast_crash_window: Duration) -> Self {
        Self { fast_crash_window }
    }

    /// Classify a source exit.
    ///
    /// `code` is `None` when the process was killed by a signal; that never
    /// counts as a clean exit.
    pub fn classify(
        &self,
        code: Option<i32>,
        alive: Duration,
        resume_offset: Duration,
    ) -> ExitVerdict {
        match code {
            Some(0) => ExitVerdict::CleanCompletion,
            _ if alive < self.fast_crash_window && !resume_offset.is_zero() => {
                ExitVerdict::FastCrashOnSeek
            }
            _ => ExitVerdict::HardFailure,
        }
    }
}
