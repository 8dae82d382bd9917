//! The election voting engine.
//!
//! Owns the election lifecycle, candidate registration, the eligibility gate,
//! ballot submission and tally maintenance. All persistence goes through an
//! injected [`Store`](crate::store::Store), and all outbound messages through
//! an injected [`Notifier`](crate::notify::Notifier).

use chrono::{DateTime, Utc};
use log::info;

use crate::error::{Error, Result};
use crate::model::{
    api::{candidate::CandidateSpec, election::ElectionSpec},
    common::{election::ElectionStatus, voter::Voter},
    db::{candidate::Candidate, election::Election},
    mongodb::Id,
};
use crate::notify::SharedNotifier;
use crate::store::SharedStore;

mod ballot;
mod tally;

#[derive(Clone)]
pub struct VotingEngine {
    store: SharedStore,
    notifier: SharedNotifier,
}

impl VotingEngine {
    pub fn new(store: SharedStore, notifier: SharedNotifier) -> Self {
        Self { store, notifier }
    }

    /// Create a new election in `draft`, with no votes.
    pub async fn create_election(&self, spec: ElectionSpec) -> Result<Election> {
        self.create_election_at(spec, Utc::now()).await
    }

    pub async fn create_election_at(
        &self,
        spec: ElectionSpec,
        now: DateTime<Utc>,
    ) -> Result<Election> {
        spec.validate()?;
        let election = self.store.insert_election(spec.into_election(now)).await?;
        info!("Created election {} '{}'", election.id, election.title);
        Ok(election)
    }

    /// Replace a draft election's specification.
    ///
    /// Positions cannot change once any candidate has been registered.
    pub async fn update_election(&self, id: Id, spec: ElectionSpec) -> Result<Election> {
        spec.validate()?;
        let existing = self.election(id).await?;
        if existing.status != ElectionStatus::Draft {
            return Err(Error::ElectionClosed(existing.status));
        }
        match self
            .store
            .replace_draft_election(id, spec.into_election(Utc::now()))
            .await?
        {
            Some(election) => Ok(election),
            None => match self.election(id).await?.status {
                ElectionStatus::Draft => Err(Error::Validation(
                    "Positions cannot change once candidates are registered".to_string(),
                )),
                status => Err(Error::ElectionClosed(status)),
            },
        }
    }

    /// Move an election along its lifecycle.
    pub async fn update_election_status(&self, id: Id, to: ElectionStatus) -> Result<Election> {
        let from = self.election(id).await?.status;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }
        match self
            .store
            .transition_election(id, from, to, Utc::now())
            .await?
        {
            Some(election) => {
                info!("Election {id} moved from {from} to {to}");
                Ok(election)
            }
            None => {
                // Someone else moved it first.
                let current = self.election(id).await?.status;
                Err(Error::InvalidTransition { from: current, to })
            }
        }
    }

    /// Register a candidate for one of an election's positions.
    pub async fn add_candidate(&self, election_id: Id, spec: CandidateSpec) -> Result<Candidate> {
        spec.validate()?;
        let candidate = self
            .store
            .insert_candidate(spec.into_candidate(election_id, Utc::now()))
            .await?;
        info!(
            "Registered candidate {} for '{}' in election {election_id}",
            candidate.id, candidate.position
        );
        Ok(candidate)
    }

    /// Elections with any of the given statuses, newest first.
    /// An empty filter lists everything.
    pub async fn list_elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>> {
        self.store.elections(statuses).await
    }

    /// Elections the voter passes the eligibility gate for.
    pub async fn eligible_elections(
        &self,
        voter: &Voter,
        statuses: &[ElectionStatus],
    ) -> Result<Vec<Election>> {
        let mut elections = self.store.elections(statuses).await?;
        elections.retain(|election| voter.is_eligible(&election.eligibility));
        Ok(elections)
    }

    pub async fn election(&self, id: Id) -> Result<Election> {
        self.store
            .election(id)
            .await?
            .ok_or_else(|| Error::not_found("Election", id))
    }

    /// An election's candidates, grouped in the election's position order.
    pub async fn list_candidates(&self, election_id: Id) -> Result<Vec<Candidate>> {
        let election = self.election(election_id).await?;
        let mut candidates = self.store.candidates(election_id).await?;
        candidates.sort_by_key(|candidate| position_index(&election, &candidate.position));
        Ok(candidates)
    }
}

/// Where a position sits in the election's ordering. Unknown positions last.
fn position_index(election: &Election, position: &str) -> usize {
    election
        .positions
        .iter()
        .position(|p| p == position)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod test_support {
    use std::sync::Arc;

    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::store::MemoryStore;

    /// An engine over fresh in-memory collaborators.
    pub fn engine() -> (VotingEngine, MemoryStore, Arc<RecordingNotifier>) {
        let store = MemoryStore::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = VotingEngine::new(Arc::new(store.clone()), notifier.clone());
        (engine, store, notifier)
    }

    /// Create the standard two-position election and move it to `active`.
    pub async fn active_election(engine: &VotingEngine, spec: ElectionSpec) -> Election {
        let election = engine.create_election(spec).await.unwrap();
        engine
            .update_election_status(election.id, ElectionStatus::Active)
            .await
            .unwrap()
    }
}
