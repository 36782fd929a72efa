//! Control-loop transitions.
//!
//! `GENERATE -> VALIDATE -> (CORRECT -> VALIDATE)* -> DONE`. The only branch is
//! evaluated after each validation.

use crate::core::types::LoopState;

/// Upper bound accepted for a caller-supplied retry budget.
pub const MAX_RETRIES_LIMIT: u32 = 5;

/// Next state after a validation pass.
///
/// Stops on approval or once `retry_count` has reached `max_retries`;
/// otherwise another correction is due.
pub fn after_validate(approved: bool, retry_count: u32, max_retries: u32) -> LoopState {
    if approved || retry_count >= max_retries {
        LoopState::Done
    } else {
        LoopState::Correct
    }
}

/// Next state for every non-branching transition.
pub fn advance(state: LoopState) -> LoopState {
    match state {
        LoopState::Generate | LoopState::Correct => LoopState::Validate,
        // Validate branches through `after_validate`.
        LoopState::Validate | LoopState::Done => LoopState::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_always_finishes() {
        assert_eq!(after_validate(true, 0, 3), LoopState::Done);
        assert_eq!(after_validate(true, 2, 3), LoopState::Done);
    }

    #[test]
    fn rejection_corrects_until_budget_reached() {
        assert_eq!(after_validate(false, 0, 2), LoopState::Correct);
        assert_eq!(after_validate(false, 1, 2), LoopState::Correct);
        assert_eq!(after_validate(false, 2, 2), LoopState::Done);
    }

    #[test]
    fn zero_budget_validates_once() {
        assert_eq!(after_validate(false, 0, 0), LoopState::Done);
    }

    #[test]
    fn generation_and_correction_lead_to_validation() {
        assert_eq!(advance(LoopState::Generate), LoopState::Validate);
        assert_eq!(advance(LoopState::Correct), LoopState::Validate);
        assert_eq!(advance(LoopState::Done), LoopState::Done);
    }
}
