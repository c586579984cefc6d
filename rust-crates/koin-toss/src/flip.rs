use thiserror::Error;
use tracing::debug;

use crate::{
    bet::{
        SubmitError,
        ValidBet,
    },
    reconcile::{
        Outcome,
        Reconciliation,
        reconcile,
    },
    types::{
        GameResult,
        TxHash,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFlip {
    pub tx_hash: TxHash,
    pub bet: ValidBet,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FlipPhase {
    #[default]
    Idle,
    AwaitingSession(ValidBet),
    Submitting(ValidBet),
    AwaitingReveal(PendingFlip),
    Resolved(Outcome),
    Failed(SubmitError),
}

impl FlipPhase {
    fn name(&self) -> &'static str {
        match self {
            FlipPhase::Idle => "idle",
            FlipPhase::AwaitingSession(_) => "awaiting session",
            FlipPhase::Submitting(_) => "submitting",
            FlipPhase::AwaitingReveal(_) => "awaiting reveal",
            FlipPhase::Resolved(_) => "resolved",
            FlipPhase::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("a flip is already in progress")]
    InFlight,
    #[error("cannot {event} while {phase}")]
    Unexpected {
        event: &'static str,
        phase: &'static str,
    },
}

/// One wager from submission to reveal.
#[derive(Clone, Debug, Default)]
pub struct FlipMachine {
    phase: FlipPhase,
}

impl FlipMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &FlipPhase {
        &self.phase
    }

    pub fn is_flipping(&self) -> bool {
        matches!(
            self.phase,
            FlipPhase::AwaitingSession(_)
                | FlipPhase::Submitting(_)
                | FlipPhase::AwaitingReveal(_)
        )
    }

    pub fn pending(&self) -> Option<&PendingFlip> {
        match &self.phase {
            FlipPhase::AwaitingReveal(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn begin(&mut self, bet: ValidBet) -> Result<(), TransitionError> {
        if self.is_flipping() {
            return Err(TransitionError::InFlight);
        }
        self.transition(FlipPhase::AwaitingSession(bet));
        Ok(())
    }

    pub fn session_ready(&mut self) -> Result<(), TransitionError> {
        match &self.phase {
            FlipPhase::AwaitingSession(bet) => {
                let bet = bet.clone();
                self.transition(FlipPhase::Submitting(bet));
                Ok(())
            }
            other => Err(unexpected("use a session", other)),
        }
    }

    pub fn submitted(&mut self, tx_hash: TxHash) -> Result<(), TransitionError> {
        match &self.phase {
            FlipPhase::Submitting(bet) => {
                let bet = bet.clone();
                self.transition(FlipPhase::AwaitingReveal(PendingFlip { tx_hash, bet }));
                Ok(())
            }
            other => Err(unexpected("record a submission", other)),
        }
    }

    pub fn fail(&mut self, error: SubmitError) -> Result<(), TransitionError> {
        match &self.phase {
            FlipPhase::AwaitingSession(_) | FlipPhase::Submitting(_) => {
                self.transition(FlipPhase::Failed(error));
                Ok(())
            }
            other => Err(unexpected("fail", other)),
        }
    }

    /// Looks for the pending wager in `history`. Returns the outcome once it is revealed.
    pub fn history_updated(&mut self, history: &[GameResult]) -> Option<Outcome> {
        let pending = self.pending()?;
        match reconcile(history, &pending.tx_hash, pending.bet.side) {
            Reconciliation::Pending => None,
            Reconciliation::Resolved(outcome) => {
                self.transition(FlipPhase::Resolved(outcome.clone()));
                Some(outcome)
            }
        }
    }

    pub fn recover(&mut self) {
        self.transition(FlipPhase::Idle);
    }

    fn transition(&mut self, next: FlipPhase) {
        debug!(from = self.phase.name(), to = next.name(), "flip transition");
        self.phase = next;
    }
}

fn unexpected(event: &'static str, phase: &FlipPhase) -> TransitionError {
    TransitionError::Unexpected {
        event,
        phase: phase.name(),
    }
}
