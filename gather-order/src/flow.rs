use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Stages of one booking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStage {
    CollectingDetails,
    AwaitingPayment,
    Verifying,
    Committing,
    Confirmed,
    Rejected,
    Abandoned,
}

impl BookingStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStage::Confirmed | BookingStage::Rejected | BookingStage::Abandoned)
    }

    pub fn can_transition_to(self, next: BookingStage) -> bool {
        use BookingStage::*;
        if next == Abandoned {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (CollectingDetails, AwaitingPayment)
                // placeholder-priced categories skip payment entirely
                | (CollectingDetails, Committing)
                | (AwaitingPayment, Verifying)
                | (Verifying, Committing)
                | (Verifying, Rejected)
                | (Committing, Confirmed)
                | (Committing, Rejected)
        )
    }
}

impl fmt::Display for BookingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStage::CollectingDetails => "COLLECTING_DETAILS",
            BookingStage::AwaitingPayment => "AWAITING_PAYMENT",
            BookingStage::Verifying => "VERIFYING",
            BookingStage::Committing => "COMMITTING",
            BookingStage::Confirmed => "CONFIRMED",
            BookingStage::Rejected => "REJECTED",
            BookingStage::Abandoned => "ABANDONED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Illegal booking transition {from} -> {to}")]
pub struct FlowError {
    pub from: BookingStage,
    pub to: BookingStage,
}

/// Tracks the stage of a single attempt and refuses illegal jumps.
#[derive(Debug, Clone)]
pub struct BookingFlow {
    attempt_id: Uuid,
    stage: BookingStage,
    history: Vec<(BookingStage, DateTime<Utc>)>,
}

impl BookingFlow {
    pub fn new(attempt_id: Uuid) -> Self {
        Self::starting_at(attempt_id, BookingStage::CollectingDetails)
    }

    /// The HTTP surface is stateless: the completion request re-enters the
    /// flow where the checkout request left it.
    pub fn resume_awaiting_payment(attempt_id: Uuid) -> Self {
        Self::starting_at(attempt_id, BookingStage::AwaitingPayment)
    }

    fn starting_at(attempt_id: Uuid, stage: BookingStage) -> Self {
        Self {
            attempt_id,
            stage,
            history: vec![(stage, Utc::now())],
        }
    }

    pub fn stage(&self) -> BookingStage {
        self.stage
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn history(&self) -> impl Iterator<Item = BookingStage> + '_ {
        self.history.iter().map(|(s, _)| *s)
    }

    pub fn advance(&mut self, next: BookingStage) -> Result<(), FlowError> {
        if !self.stage.can_transition_to(next) {
            return Err(FlowError { from: self.stage, to: next });
        }
        tracing::debug!(attempt_id = %self.attempt_id, from = %self.stage, to = %next, "booking stage change");
        self.stage = next;
        self.history.push((next, Utc::now()));
        Ok(())
    }

    pub fn abandon(&mut self) -> Result<(), FlowError> {
        self.advance(BookingStage::Abandoned)
    }
}
