//! Filter lifecycle state machine
//!
//! ```text
//! [Initialized] ──apply──→ [Applying] ──ok──→ [Applied]
//!       ▲                       │
//!       │                       └──error──→ [Failed]
//!       └──────────── reset ─────────────────┘ (from any state)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Lifecycle state of one filter instance
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterState {
    #[default]
    Initialized,
    Applying,
    Applied,
    Failed,
}

impl FilterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterState::Initialized => "initialized",
            FilterState::Applying => "applying",
            FilterState::Applied => "applied",
            FilterState::Failed => "failed",
        }
    }

    /// `Applied` and `Failed` end a lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, FilterState::Applied | FilterState::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: FilterState) -> bool {
        use FilterState::*;
        matches!(
            (self, next),
            (Initialized, Applying) | (Applying, Applied) | (Applying, Failed) | (_, Initialized)
        )
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition_to(&mut self, next: FilterState) -> Result<(), FilterError> {
        if !self.can_transition_to(next) {
            return Err(FilterError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
