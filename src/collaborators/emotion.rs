use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const PENDING_LABEL: &str = "thinking";
const NEGATIONS: &[&str] = &["not", "no", "never", "isn't", "wasn't", "hardly"];

/// Emotion label attached to a turn. The set is open: anything outside the
/// conventional labels is kept verbatim as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Neutral,
    Other(String),
    /// Placeholder while a turn is still being processed; never persisted.
    Pending,
}

impl Emotion {
    /// Normalises a collaborator label. Returns `None` for an empty label.
    ///
    /// Every word is checked against the conventional labels and their
    /// synonyms, so "very sad" or "Emotion: joy" resolve to the label they
    /// name. A synonym directly after a negation ("not happy") does not count.
    /// Labels that name nothing conventional are kept whole as `Other`.
    pub fn parse(raw: &str) -> Option<Self> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let label = collapsed
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if label.is_empty() {
            return None;
        }
        if label == PENDING_LABEL {
            return Some(Emotion::Pending);
        }

        let words: Vec<&str> = label
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|word| !word.is_empty())
            .collect();
        let named = words.iter().enumerate().find_map(|(index, word)| {
            let negated = index > 0 && NEGATIONS.contains(&words[index - 1]);
            if negated {
                None
            } else {
                Self::from_synonym(word)
            }
        });

        Some(named.unwrap_or(Emotion::Other(label)))
    }

    fn from_synonym(word: &str) -> Option<Self> {
        match word {
            "joy" | "happy" | "happiness" | "joyful" | "excited" => Some(Emotion::Joy),
            "sadness" | "sad" | "grief" | "sorrow" => Some(Emotion::Sadness),
            "anger" | "angry" | "frustration" | "frustrated" => Some(Emotion::Anger),
            "fear" | "afraid" | "anxiety" | "anxious" | "scared" => Some(Emotion::Fear),
            "surprise" | "surprised" => Some(Emotion::Surprise),
            "disgust" | "disgusted" => Some(Emotion::Disgust),
            "neutral" | "calm" => Some(Emotion::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Disgust => "disgust",
            Emotion::Neutral => "neutral",
            Emotion::Other(label) => label.as_str(),
            Emotion::Pending => PENDING_LABEL,
        }
    }

    /// True only for the placeholder sentinel.
    pub fn is_pending(&self) -> bool {
        matches!(self, Emotion::Pending)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Emotion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Emotion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Emotion::parse(&raw).ok_or_else(|| serde::de::Error::custom("empty emotion label"))
    }
}
