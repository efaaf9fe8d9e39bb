use continuum_core::prelude::*;
use rand::Rng;
use tracing::info;

use crate::{semantics::Semantics, LearningError};

use super::{EquivalenceOracle, Hypothesis, KearnsVazirani, MembershipOracle, Reviser};

/// What a run of [`ConflictAware`] produced.
#[derive(Debug, Clone)]
pub struct Outcome<A: Alphabet, M: Semantics<A::Symbol>> {
    /// Every hypothesis the learner produced, together with the number of queries that had
    /// been posed to the system under learning at that time.
    pub snapshots: Vec<(usize, Hypothesis<A, M>)>,
    /// Query indices at which a conflict was detected.
    pub conflicts: Vec<usize>,
    /// Number of queries that were posed to the system under learning.
    pub queries: usize,
    /// True if learning stopped because no counterexample was found, false if it ran out of
    /// queries.
    pub converged: bool,
}

impl<A: Alphabet, M: Semantics<A::Symbol>> Outcome<A, M> {
    /// The last hypothesis that was produced.
    pub fn last(&self) -> Option<&Hypothesis<A, M>> {
        self.snapshots.last().map(|(_, hypothesis)| hypothesis)
    }
}

enum Flow {
    Restart,
    Stop,
}

/// Drives a [`KearnsVazirani`] learner through a [`Reviser`]. Whenever the reviser reports a
/// conflict, everything the learner built is discarded and learning starts over on the
/// revised cache. Running out of queries ends learning.
pub struct ConflictAware<O: MembershipOracle, R> {
    reviser: Reviser<O, R>,
    filler: <O::Semantics as Semantics<SymbolOf<O::Alphabet>>>::Filler,
}

impl<O: MembershipOracle, R: Rng> ConflictAware<O, R> {
    /// Creates a driver, unknown observations in hypotheses are reported as `filler`.
    pub fn new(
        reviser: Reviser<O, R>,
        filler: <O::Semantics as Semantics<SymbolOf<O::Alphabet>>>::Filler,
    ) -> Self {
        Self { reviser, filler }
    }

    /// The reviser that answers the learner's queries.
    pub fn reviser(&self) -> &Reviser<O, R> {
        &self.reviser
    }

    fn handle(
        &mut self,
        error: LearningError<SymbolOf<O::Alphabet>>,
        conflicts: &mut Vec<usize>,
    ) -> Result<Flow, LearningError<SymbolOf<O::Alphabet>>> {
        match error {
            LearningError::Conflict { word } => {
                info!(
                    "conflict on {} after {} queries, restarting",
                    word.as_string(),
                    self.reviser.queries()
                );
                conflicts.push(self.reviser.queries());
                Ok(Flow::Restart)
            }
            LearningError::LimitReached { limit } => {
                info!("query limit of {limit} reached");
                Ok(Flow::Stop)
            }
            other => Err(other),
        }
    }

    /// Learns until no counterexample is found or the system under learning refuses further
    /// queries.
    pub fn run(&mut self) -> Result<Outcome<O::Alphabet, O::Semantics>, LearningError<SymbolOf<O::Alphabet>>> {
        let mut snapshots = vec![];
        let mut conflicts = vec![];
        let mut learner =
            KearnsVazirani::new(self.reviser.alphabet().clone(), self.filler.clone());

        let converged = 'restart: loop {
            if let Err(error) = learner.start(&mut self.reviser) {
                match self.handle(error, &mut conflicts)? {
                    Flow::Restart => continue 'restart,
                    Flow::Stop => break 'restart false,
                }
            }
            snapshots.push((self.reviser.queries(), learner.hypothesis().clone()));

            loop {
                let counterexample = match self.reviser.find_counterexample(learner.hypothesis()) {
                    Ok(Some(counterexample)) => counterexample,
                    Ok(None) => break 'restart true,
                    Err(error) => match self.handle(error, &mut conflicts)? {
                        Flow::Restart => continue 'restart,
                        Flow::Stop => break 'restart false,
                    },
                };
                let refined = match learner.refine(&counterexample, &mut self.reviser) {
                    Ok(false) => {
                        // stale cached answers can hide a counterexample, so ask the system
                        let caching = self.reviser.caching();
                        self.reviser.set_caching(false);
                        let retried = learner.refine(&counterexample, &mut self.reviser);
                        self.reviser.set_caching(caching);
                        retried
                    }
                    other => other,
                };
                match refined {
                    Ok(_) => {
                        snapshots.push((self.reviser.queries(), learner.hypothesis().clone()))
                    }
                    Err(error) => match self.handle(error, &mut conflicts)? {
                        Flow::Restart => continue 'restart,
                        Flow::Stop => break 'restart false,
                    },
                }
            }
        };

        info!(
            "conflict-aware learning stopped after {} queries and {} conflicts",
            self.reviser.queries(),
            conflicts.len()
        );
        Ok(Outcome {
            snapshots,
            conflicts,
            queries: self.reviser.queries(),
            converged,
        })
    }
}
