use std::fmt::Display;

use mongodb::bson::{to_bson, Bson};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
///
/// ```text
/// Draft ──> Active ──> Completed
///   │         │
///   └────┬────┘
///        v
///    Cancelled
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    /// Under construction, only visible to admins.
    Draft,
    /// Open for ballots, subject to the election's time window.
    Active,
    /// Closed normally. Terminal.
    Completed,
    /// Abandoned before completion. Terminal.
    Cancelled,
}

impl ElectionStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [ElectionStatus; 4] = [
        ElectionStatus::Draft,
        ElectionStatus::Active,
        ElectionStatus::Completed,
        ElectionStatus::Cancelled,
    ];

    /// No transition leads out of a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Is `self -> next` an edge of the lifecycle?
    pub fn can_transition_to(self, next: ElectionStatus) -> bool {
        use ElectionStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Active, Completed) | (Draft, Cancelled) | (Active, Cancelled)
        )
    }
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
