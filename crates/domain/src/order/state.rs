//! Order status transition rules.

use std::str::FromStr;

use common::OrderStatus;

use crate::error::DomainError;

/// Which status changes an update may perform.
///
/// ```text
/// Strict:        Received ──► Preparing ──► Ready ──► Delivered
/// Unrestricted:  any status ──► any status
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Only the immediate successor of the current status is allowed.
    #[default]
    Strict,

    /// Any status may be set from any status.
    Unrestricted,
}

impl TransitionPolicy {
    /// Returns true if an order in `from` may move to `to`.
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        match self {
            TransitionPolicy::Strict => from.next() == Some(to),
            TransitionPolicy::Unrestricted => true,
        }
    }

    /// Like [`allows`](Self::allows), but as a domain error.
    pub fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), DomainError> {
        if self.allows(from, to) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition { from, to })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::Strict => "strict",
            TransitionPolicy::Unrestricted => "unrestricted",
        }
    }
}

impl std::fmt::Display for TransitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(TransitionPolicy::Strict),
            "unrestricted" => Ok(TransitionPolicy::Unrestricted),
            other => Err(format!("unknown transition policy: {other}")),
        }
    }
}
