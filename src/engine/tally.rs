use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    api::results::{
        CandidateTally, ElectionResults, PositionResults, TallyAudit, TallyDiscrepancy,
    },
    mongodb::Id,
};

use super::VotingEngine;

impl VotingEngine {
    /// Current tallies, per position, highest first.
    pub async fn results(&self, election_id: Id) -> Result<ElectionResults> {
        let election = self.election(election_id).await?;
        let candidates = self.store.candidates(election_id).await?;

        let positions = election
            .positions
            .iter()
            .map(|position| {
                let mut tallies: Vec<_> = candidates
                    .iter()
                    .filter(|candidate| &candidate.position == position)
                    .map(|candidate| CandidateTally {
                        candidate_id: candidate.id.into(),
                        name: candidate.name.clone(),
                        votes: candidate.votes,
                    })
                    .collect();
                tallies.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));
                PositionResults {
                    position: position.clone(),
                    candidates: tallies,
                }
            })
            .collect();

        Ok(ElectionResults {
            election_id: election.id.into(),
            status: election.status,
            total_votes: election.total_votes,
            positions,
        })
    }

    /// Recount the ballot log and compare it with the stored counters.
    pub async fn audit_tally(&self, election_id: Id) -> Result<TallyAudit> {
        let election = self.election(election_id).await?;
        let candidates = self.store.candidates(election_id).await?;
        let ballots = self.store.ballots(election_id).await?;

        let mut counted: HashMap<Id, u64> = HashMap::new();
        for ballot in &ballots {
            for candidate_id in ballot.candidate_ids() {
                *counted.entry(candidate_id).or_default() += 1;
            }
        }

        let mut discrepancies = Vec::new();
        let ballots_counted = ballots.len() as u64;
        if ballots_counted != election.total_votes {
            discrepancies.push(TallyDiscrepancy::TotalVotes {
                recorded: election.total_votes,
                counted: ballots_counted,
            });
        }
        for candidate in &candidates {
            let counted = counted.remove(&candidate.id).unwrap_or(0);
            if counted != candidate.votes {
                discrepancies.push(TallyDiscrepancy::CandidateVotes {
                    candidate_id: candidate.id.into(),
                    recorded: candidate.votes,
                    counted,
                });
            }
        }
        // Whatever is left was voted for but is not standing here.
        let mut unknown: Vec<_> = counted.into_iter().collect();
        unknown.sort();
        discrepancies.extend(unknown.into_iter().map(|(candidate_id, counted)| {
            TallyDiscrepancy::UnknownCandidate {
                candidate_id: candidate_id.into(),
                counted,
            }
        }));

        Ok(TallyAudit {
            election_id: election.id.into(),
            ballots_counted,
            recorded_total_votes: election.total_votes,
            discrepancies,
        })
    }
}
