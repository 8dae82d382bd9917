use serde::{Deserialize, Serialize};

use crate::model::{api::id::ApiId, common::election::ElectionStatus};

/// Tallies for a whole election, grouped by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: ApiId,
    pub status: ElectionStatus,
    pub total_votes: u64,
    pub positions: Vec<PositionResults>,
}

/// Tallies for one position, highest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResults {
    pub position: String,
    pub candidates: Vec<CandidateTally>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: ApiId,
    pub name: String,
    pub votes: u64,
}

/// Stored counters compared against a recount of the ballot log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyAudit {
    pub election_id: ApiId,
    pub ballots_counted: u64,
    pub recorded_total_votes: u64,
    pub discrepancies: Vec<TallyDiscrepancy>,
}

impl TallyAudit {
    /// Do the stored counters agree with the ballot log?
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// One way the stored counters disagree with the ballot log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TallyDiscrepancy {
    /// The election's ballot counter is off.
    TotalVotes { recorded: u64, counted: u64 },
    /// A candidate's stored tally is off.
    CandidateVotes {
        candidate_id: ApiId,
        recorded: u64,
        counted: u64,
    },
    /// Ballots name a candidate who is not standing in this election.
    UnknownCandidate { candidate_id: ApiId, counted: u64 },
}
