use crate::models::{Position, PositionRecord};
use chrono::NaiveDate;

/// Three-state decision machine over the daily composite score.
///
/// Transitions into OPEN or HEDGE require the candidate state to hold for
/// `confirmation_sessions` consecutive sessions so single-day noise never
/// flips the live position; the transition back to MONITOR is immediate.
/// A day without a score holds the previous state and is flagged stale.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    state: Position,
    streak_candidate: Position,
    streak: usize,
    open_threshold: f64,
    hedge_threshold: f64,
    confirmation_sessions: usize,
}

impl DecisionEngine {
    pub fn new(open_threshold: f64, hedge_threshold: f64, confirmation_sessions: usize) -> Self {
        Self {
            state: Position::Monitor,
            streak_candidate: Position::Monitor,
            streak: 0,
            open_threshold,
            hedge_threshold,
            confirmation_sessions: confirmation_sessions.max(1),
        }
    }

    pub fn state(&self) -> Position {
        self.state
    }

    /// Classifies a score against the decision thresholds. These are
    /// distinct from the indicator range bands.
    pub fn classify(&self, score: f64) -> Position {
        if score >= self.open_threshold {
            Position::Open
        } else if score <= self.hedge_threshold {
            Position::Hedge
        } else {
            Position::Monitor
        }
    }

    /// Consumes one session. `None` means the day's composite score could
    /// not be computed.
    pub fn step(&mut self, date: NaiveDate, score: Option<f64>) -> PositionRecord {
        let previous = self.state;

        let Some(score) = score else {
            self.streak = 0;
            self.streak_candidate = Position::Monitor;
            return PositionRecord {
                date,
                position: self.state,
                score: None,
                previous,
                stale: true,
            };
        };

        let candidate = self.classify(score);

        if candidate == Position::Monitor {
            // Fail-safe: back to MONITOR without confirmation.
            self.state = Position::Monitor;
            self.streak = 0;
            self.streak_candidate = Position::Monitor;
        } else if candidate == self.state {
            self.streak = 0;
            self.streak_candidate = Position::Monitor;
        } else {
            if candidate == self.streak_candidate {
                self.streak += 1;
            } else {
                self.streak_candidate = candidate;
                self.streak = 1;
            }
            if self.streak >= self.confirmation_sessions {
                self.state = candidate;
                self.streak = 0;
                self.streak_candidate = Position::Monitor;
            }
        }

        PositionRecord {
            date,
            position: self.state,
            score: Some(score),
            previous,
            stale: false,
        }
    }
}
