//! Factory-reset challenge: a single pending six-digit code.
//!
//! "No challenge pending" is a distinguishable state, not just absence. At
//! most one challenge exists at a time; a second reset request overwrites the
//! first, and a restart abandons whatever was pending. The code is consumed
//! by the one confirmation that matches it.

use rand::Rng;

use super::registry::Principal;

/// The reset confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetChallenge {
    Idle,
    Pending { code: u32, issued_to: Principal },
}

impl Default for ResetChallenge {
    fn default() -> Self {
        ResetChallenge::Idle
    }
}

impl ResetChallenge {
    pub fn new() -> Self {
        ResetChallenge::Idle
    }

    /// Generate a fresh six-digit code for `principal`, overwriting any
    /// pending challenge.
    pub fn issue(&mut self, principal: Principal) -> u32 {
        let code = rand::thread_rng().gen_range(100_000..=999_999);
        *self = ResetChallenge::Pending {
            code,
            issued_to: principal,
        };
        code
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ResetChallenge::Pending { .. })
    }

    /// The confirmation phrase the sender has to type for `code`.
    pub fn confirmation_phrase(code: u32) -> String {
        format!("reset {code}")
    }

    /// True iff a challenge is pending for `principal` and `text` matches its
    /// confirmation phrase, case-insensitively.
    pub fn matches(&self, principal: Principal, text: &str) -> bool {
        match self {
            ResetChallenge::Pending { code, issued_to } => {
                *issued_to == principal
                    && text
                        .trim()
                        .eq_ignore_ascii_case(&Self::confirmation_phrase(*code))
            }
            ResetChallenge::Idle => false,
        }
    }

    /// Invalidate the pending challenge after a successful confirmation.
    pub fn consume(&mut self) {
        *self = ResetChallenge::Idle;
    }
}
