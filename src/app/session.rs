//! Single-slot cache for the most recent forecast result.
//!
//! The slot is cleared when a submission starts and when the selected file
//! changes. Each clear bumps a generation counter; a result is only stored if
//! it was produced for the current generation, so a response that arrives
//! after the user moved on is dropped instead of shown against the wrong file.

use crate::domain::{ForecastMode, ForecastParams, ForecastResponse};

/// A completed forecast plus the settings it was requested with.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub mode: ForecastMode,
    pub params: ForecastParams,
    pub response: ForecastResponse,
}

/// Ticket handed out by [`ResultSlot::begin_submission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission(u64);

#[derive(Debug, Default)]
pub struct ResultSlot {
    current: Option<ForecastResult>,
    generation: u64,
}

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the slot and return a ticket for the new request.
    pub fn begin_submission(&mut self) -> Submission {
        self.invalidate();
        Submission(self.generation)
    }

    /// Store a result. Returns `false` (and drops it) if the ticket is stale.
    pub fn store(&mut self, ticket: Submission, result: ForecastResult) -> bool {
        if ticket.0 != self.generation {
            tracing::debug!(ticket = ticket.0, generation = self.generation, "dropping stale result");
            return false;
        }
        self.current = Some(result);
        true
    }

    pub fn clear_on_file_change(&mut self) {
        self.invalidate();
    }

    pub fn current(&self) -> Option<&ForecastResult> {
        self.current.as_ref()
    }

    fn invalidate(&mut self) {
        self.current = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> ForecastResult {
        ForecastResult {
            mode: ForecastMode::Finetune,
            params: ForecastParams::default(),
            response: ForecastResponse {
                model_id: Some(id.to_string()),
                ..ForecastResponse::default()
            },
        }
    }

    #[test]
    fn submission_clears_previous_result() {
        let mut slot = ResultSlot::new();
        let first = slot.begin_submission();
        assert!(slot.store(first, result("a")));
        assert!(slot.current().is_some());

        let _second = slot.begin_submission();
        assert!(slot.current().is_none());
    }

    #[test]
    fn file_change_discards_in_flight_result() {
        let mut slot = ResultSlot::new();
        let ticket = slot.begin_submission();
        slot.clear_on_file_change();

        assert!(!slot.store(ticket, result("late")));
        assert!(slot.current().is_none());
    }

    #[test]
    fn only_latest_ticket_is_accepted() {
        let mut slot = ResultSlot::new();
        let old = slot.begin_submission();
        let new = slot.begin_submission();

        assert!(!slot.store(old, result("old")));
        assert!(slot.store(new, result("new")));
        assert_eq!(
            slot.current().and_then(|r| r.response.model_id.as_deref()),
            Some("new")
        );
    }
}
