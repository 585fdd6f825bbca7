use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exercises the pose server knows how to analyze. The serialized names are
/// the exact strings the server matches on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Exercise {
    Squats,
    Warrior,
    LegRaises,
    Lunges,
}

impl Exercise {
    pub const ALL: [Exercise; 4] = [
        Exercise::Squats,
        Exercise::Warrior,
        Exercise::LegRaises,
        Exercise::Lunges,
    ];

    /// Wire name sent in the `start` command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Exercise::Squats => "Squats",
            Exercise::Warrior => "Warrior",
            Exercise::LegRaises => "LegRaises",
            Exercise::Lunges => "Lunges",
        }
    }
}

impl fmt::Display for Exercise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown exercise `{0}`, expected one of: squats, warrior, leg-raises, lunges")]
pub struct UnknownExercise(String);

impl FromStr for Exercise {
    type Err = UnknownExercise;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "squats" | "squat" => Ok(Exercise::Squats),
            "warrior" | "warrior-pose" => Ok(Exercise::Warrior),
            "legraises" | "leg-raises" | "leg_raises" => Ok(Exercise::LegRaises),
            "lunges" | "lunge" => Ok(Exercise::Lunges),
            _ => Err(UnknownExercise(s.to_string())),
        }
    }
}

/// Whether the server should synthesize spoken feedback alongside frames.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioBot {
    On,
    #[default]
    Off,
}

impl AudioBot {
    pub fn is_on(&self) -> bool {
        matches!(self, AudioBot::On)
    }
}

impl FromStr for AudioBot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(AudioBot::On),
            "off" => Ok(AudioBot::Off),
            other => Err(format!("unknown audiobot setting `{other}`, expected on|off")),
        }
    }
}

/// Spoken-feedback language.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ur,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "ur" => Ok(Language::Ur),
            other => Err(format!("unknown language `{other}`, expected en|ur")),
        }
    }
}

/// Per-session preferences. The web client kept these in localStorage and
/// read them ambiently; here they are passed explicitly when the session is
/// created and travel with the `start` command.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    pub audiobot: AudioBot,
    pub language: Option<Language>,
}
