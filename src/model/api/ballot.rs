use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    db::ballot::{Ballot, Choice},
    mongodb::Id,
};

/// A ballot the voter wishes to cast: one candidate for every position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSpec {
    /// Position name to chosen candidate.
    pub votes: HashMap<String, ApiId>,
}

impl BallotSpec {
    /// The choices as database IDs.
    pub fn choices(&self) -> HashMap<String, Id> {
        self.votes
            .iter()
            .map(|(position, candidate)| (position.clone(), Id::from(*candidate)))
            .collect()
    }
}

/// One position's choice, as shown back to the voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDescription {
    pub position: String,
    pub candidate_id: ApiId,
}

impl From<Choice> for ChoiceDescription {
    fn from(choice: Choice) -> Self {
        Self {
            position: choice.position,
            candidate_id: choice.candidate_id.into(),
        }
    }
}

/// Proof of an accepted ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub ballot_id: ApiId,
    pub election_id: ApiId,
    pub voter_id: String,
    pub choices: Vec<ChoiceDescription>,
    pub cast_at: DateTime<Utc>,
}

impl From<Ballot> for Receipt {
    fn from(ballot: Ballot) -> Self {
        let core = ballot.ballot;
        Self {
            ballot_id: ballot.id.into(),
            election_id: core.election_id.into(),
            voter_id: core.voter_id,
            choices: core.choices.into_iter().map(Into::into).collect(),
            cast_at: core.cast_at,
        }
    }
}

/// Whether the requesting voter has voted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotedStatus {
    pub has_voted: bool,
}
