use std::fmt;

use serde::Serialize;

/// Which backend the selector will use for the next detection.
///
/// `Uninitialized` and `Neural` both prefer the neural path. Once the
/// neural path fails the mode never returns to either of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Uninitialized,
    Neural,
    Classical,
    NoneAvailable,
}

/// Something the selector observed while obtaining or running a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    NeuralReady,
    NeuralFailed,
    ClassicalReady,
    ClassicalUnavailable,
}

impl BackendMode {
    /// The mode after `event`.
    ///
    /// `NeuralFailed` is a one-way door: no event leads back to `Neural`
    /// from `Classical` or `NoneAvailable`. `NoneAvailable` is left again
    /// only when a later classical construction succeeds.
    pub fn transition(self, event: BackendEvent) -> BackendMode {
        use BackendEvent::*;
        use BackendMode::*;

        match (self, event) {
            (Uninitialized | Neural, NeuralReady) => Neural,
            (Uninitialized | Neural, NeuralFailed) => Classical,
            (_, ClassicalReady) => Classical,
            (_, ClassicalUnavailable) => NoneAvailable,
            (Classical | NoneAvailable, NeuralReady | NeuralFailed) => self,
        }
    }

    pub fn prefers_neural(self) -> bool {
        matches!(self, BackendMode::Uninitialized | BackendMode::Neural)
    }

    /// True once the neural path has been abandoned for good.
    pub fn is_downgraded(self) -> bool {
        !self.prefers_neural()
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Uninitialized => write!(f, "uninitialized"),
            BackendMode::Neural => write!(f, "neural"),
            BackendMode::Classical => write!(f, "classical"),
            BackendMode::NoneAvailable => write!(f, "none available"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BackendEvent::*;
    use super::BackendMode::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::first_neural_load(Uninitialized, NeuralReady, Neural)]
    #[case::first_neural_failure(Uninitialized, NeuralFailed, Classical)]
    #[case::neural_stays_neural(Neural, NeuralReady, Neural)]
    #[case::neural_runtime_failure(Neural, NeuralFailed, Classical)]
    #[case::classical_loaded(Classical, ClassicalReady, Classical)]
    #[case::classical_missing(Classical, ClassicalUnavailable, NoneAvailable)]
    #[case::classical_appears_later(NoneAvailable, ClassicalReady, Classical)]
    #[case::still_nothing(NoneAvailable, ClassicalUnavailable, NoneAvailable)]
    fn test_transition(
        #[case] from: BackendMode,
        #[case] event: BackendEvent,
        #[case] expected: BackendMode,
    ) {
        assert_eq!(from.transition(event), expected);
    }

    #[rstest]
    #[case(Classical)]
    #[case(NoneAvailable)]
    fn test_downgrade_is_permanent(#[case] from: BackendMode) {
        assert_eq!(from.transition(NeuralReady), from);
        assert_eq!(from.transition(NeuralFailed), from);
        for event in [NeuralReady, NeuralFailed, ClassicalReady, ClassicalUnavailable] {
            assert!(from.transition(event).is_downgraded());
        }
    }

    #[test]
    fn test_prefers_neural() {
        assert!(Uninitialized.prefers_neural());
        assert!(Neural.prefers_neural());
        assert!(!Classical.prefers_neural());
        assert!(!NoneAvailable.prefers_neural());
    }

    #[test]
    fn test_display() {
        assert_eq!(NoneAvailable.to_string(), "none available");
        assert_eq!(Classical.to_string(), "classical");
    }
}
