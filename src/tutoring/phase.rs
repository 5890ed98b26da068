use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a Socratic tutoring dialogue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TutoringPhase {
    #[default]
    Initial,
    Explanation,
    Implementation,
    Debugging,
    Reflection,
}

impl TutoringPhase {
    pub const ALL: [TutoringPhase; 5] = [
        TutoringPhase::Initial,
        TutoringPhase::Explanation,
        TutoringPhase::Implementation,
        TutoringPhase::Debugging,
        TutoringPhase::Reflection,
    ];

    /// Uppercase label used by the classifier.
    pub fn label(&self) -> &'static str {
        match self {
            TutoringPhase::Initial => "INITIAL",
            TutoringPhase::Explanation => "EXPLANATION",
            TutoringPhase::Implementation => "IMPLEMENTATION",
            TutoringPhase::Debugging => "DEBUGGING",
            TutoringPhase::Reflection => "REFLECTION",
        }
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TutoringPhase::Initial => "initial",
            TutoringPhase::Explanation => "explanation",
            TutoringPhase::Implementation => "implementation",
            TutoringPhase::Debugging => "debugging",
            TutoringPhase::Reflection => "reflection",
        }
    }

    /// Parse an exact uppercase label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|phase| phase.label() == label)
    }

    /// Human-readable summary shown to students.
    pub fn summary(&self) -> &'static str {
        match self {
            TutoringPhase::Initial => "Understanding your problem",
            TutoringPhase::Explanation => "Breaking down the problem",
            TutoringPhase::Implementation => "Working on the solution",
            TutoringPhase::Debugging => "Fixing issues",
            TutoringPhase::Reflection => "Reviewing and learning",
        }
    }
}

impl fmt::Display for TutoringPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip() {
        for phase in TutoringPhase::ALL {
            assert_eq!(TutoringPhase::from_label(phase.label()), Some(phase));
        }
        assert_eq!(TutoringPhase::from_label("initial"), None);
        assert_eq!(TutoringPhase::from_label("PLANNING"), None);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&TutoringPhase::Implementation).unwrap(),
            "\"implementation\""
        );
        let phase: TutoringPhase = serde_json::from_str("\"reflection\"").unwrap();
        assert_eq!(phase, TutoringPhase::Reflection);
    }

    #[test]
    fn test_summaries() {
        assert_eq!(TutoringPhase::Initial.summary(), "Understanding your problem");
        assert_eq!(TutoringPhase::Debugging.summary(), "Fixing issues");
        assert_eq!(TutoringPhase::Reflection.summary(), "Reviewing and learning");
    }

    #[test]
    fn test_default_is_initial() {
        assert_eq!(TutoringPhase::default(), TutoringPhase::Initial);
    }
}
