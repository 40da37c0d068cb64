use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// States of the trial controller, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialPhase {
    #[default]
    Idle,
    Fixation,
    Sample,
    Delay,
    ChoicesPrerender,
    Choices,
    Timeout,
    Feedback,
    End,
}

impl TrialPhase {
    /// Only interactive choices accept responses.
    pub fn allows_input(&self) -> bool {
        matches!(self, Self::Choices)
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Idle | Self::End)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Fixation => "FIXATION",
            Self::Sample => "SAMPLE",
            Self::Delay => "DELAY",
            Self::ChoicesPrerender => "CHOICES_PRERENDER",
            Self::Choices => "CHOICES",
            Self::Timeout => "TIMEOUT",
            Self::Feedback => "FEEDBACK",
            Self::End => "END",
        };
        f.write_str(name)
    }
}

/// Which trial pool a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Practice,
    #[default]
    Main,
}

impl SessionMode {
    pub fn is_practice(&self) -> bool {
        matches!(self, Self::Practice)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Practice => "practice",
            Self::Main => "main",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "practice" => Ok(Self::Practice),
            "main" => Ok(Self::Main),
            other => Err(format!("unknown session mode '{other}'")),
        }
    }
}
