use continuum_core::prelude::*;
use thiserror::Error;

/// The recoverable signals that can interrupt learning. Neither of them is fatal: a
/// [`LearningError::Conflict`] asks the caller to repair or restart whatever was derived from
/// the stale answer, a [`LearningError::LimitReached`] is the regular way in which a run with a
/// query budget ends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LearningError<S: Symbol> {
    /// Two incompatible answers were observed for the same input.
    #[error("conflicting answers for input \"{}\"", .word.as_string())]
    Conflict {
        /// The input whose answer changed.
        word: Vec<S>,
    },
    /// The query budget is exhausted.
    #[error("query limit of {limit} reached")]
    LimitReached {
        /// The budget that was exhausted.
        limit: usize,
    },
    /// A configuration value is out of its admissible range.
    #[error("invalid value {value} for parameter `{name}`")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// The rejected value, rendered as a string.
        value: String,
    },
}

impl<S: Symbol> LearningError<S> {
    /// Returns true if `self` is a [`LearningError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, LearningError::Conflict { .. })
    }

    /// Returns true if `self` is a [`LearningError::LimitReached`].
    pub fn is_limit(&self) -> bool {
        matches!(self, LearningError::LimitReached { .. })
    }
}
