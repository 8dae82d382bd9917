use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// One position's choice within a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub position: String,
    pub candidate_id: Id,
}

/// A voter's complete ballot for one election, as stored in the database.
///
/// Ballots are immutable once stored, and the database holds at most one per
/// `(election_id, voter_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCore {
    pub election_id: Id,
    pub voter_id: String,
    /// Exactly one choice per election position.
    pub choices: Vec<Choice>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
    /// Network origin of the submission, if known.
    pub origin: Option<String>,
}

impl BallotCore {
    /// The candidates this ballot counts towards.
    pub fn candidate_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.choices.iter().map(|choice| choice.candidate_id)
    }
}

/// A ballot without an ID.
pub type NewBallot = BallotCore;

/// A ballot from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub ballot: BallotCore,
}

impl Deref for Ballot {
    type Target = BallotCore;

    fn deref(&self) -> &Self::Target {
        &self.ballot
    }
}
