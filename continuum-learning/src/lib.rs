//! Learning finite-state models of systems whose behaviour may change while they are being
//! learned. Queries are answered one at a time, answers that contradict earlier ones are not
//! treated as errors but as a sign that the system has changed.

mod error;
pub use error::LearningError;

mod config;
pub use config::LearnerConfig;

/// The kinds of models that can be learned and how answers to queries are interpreted.
pub mod semantics;

/// Discrimination trees and the cache of answers.
pub mod datastructure;

/// Learners, oracles and the activities of the continuous learner.
pub mod active;

/// Re-exports the most commonly used items.
pub mod prelude {
    pub use super::{
        active::{
            ConflictAware, ContinuousLearner, Counterexample, CountingOracle, EquivalenceOracle,
            Hypothesis, KearnsVazirani, LimitOracle, MembershipOracle, MutatingOracle, Reviser,
            SimulatorOracle, Target, TestWords,
        },
        semantics::{Acceptor, Semantics, Transducer},
        LearnerConfig, LearningError,
    };
}
