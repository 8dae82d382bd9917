use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::error::{Error, Result};
use crate::model::{
    common::{election::ElectionStatus, voter::Voter},
    db::{
        ballot::{Ballot, Choice, NewBallot},
        election::Election,
    },
    mongodb::Id,
};
use crate::notify::{notify, Event, Notification};

use super::VotingEngine;

impl VotingEngine {
    /// Cast a voter's ballot: one candidate for every position.
    pub async fn submit_ballot(
        &self,
        voter: &Voter,
        election_id: Id,
        choices: HashMap<String, Id>,
        origin: Option<String>,
    ) -> Result<Ballot> {
        self.submit_ballot_at(voter, election_id, choices, origin, Utc::now())
            .await
    }

    /// [`Self::submit_ballot`] with an explicit clock.
    ///
    /// Every check before the store write is side-effect free, and the write
    /// itself is all or nothing.
    pub async fn submit_ballot_at(
        &self,
        voter: &Voter,
        election_id: Id,
        choices: HashMap<String, Id>,
        origin: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Ballot> {
        let election = self.election(election_id).await?;

        if !voter.is_eligible(&election.eligibility) {
            return Err(Error::NotEligible(format!(
                "Voter {} may not vote in election {election_id}",
                voter.voter_id
            )));
        }
        if election.status != ElectionStatus::Active {
            return Err(Error::ElectionNotActive(election.status));
        }
        if !election.is_open_at(now) {
            return Err(Error::OutOfWindow);
        }
        if self.store.has_ballot(election_id, &voter.voter_id).await? {
            return Err(Error::AlreadyVoted);
        }
        let choices = self.validate_choices(&election, choices).await?;

        // A concurrent duplicate that slipped past the check above is caught here.
        let ballot = self
            .store
            .apply_ballot(NewBallot {
                election_id,
                voter_id: voter.voter_id.clone(),
                choices,
                cast_at: now,
                origin,
            })
            .await?;
        info!(
            "Accepted ballot {} from {} in election {election_id}",
            ballot.id, voter.voter_id
        );

        self.notify_ballot_accepted(&election, &ballot).await;
        Ok(ballot)
    }

    /// Has the voter already cast a ballot in this election?
    pub async fn has_voted(&self, voter_id: &str, election_id: Id) -> Result<bool> {
        self.store.has_ballot(election_id, voter_id).await
    }

    /// Check the ballot names exactly the election's positions, each with one
    /// of that position's candidates. Returns the choices in position order.
    async fn validate_choices(
        &self,
        election: &Election,
        mut choices: HashMap<String, Id>,
    ) -> Result<Vec<Choice>> {
        if let Some(unknown) = choices.keys().find(|p| !election.has_position(p)) {
            return Err(Error::InvalidBallot(format!(
                "'{unknown}' is not a position in this election"
            )));
        }

        let mut ordered = Vec::with_capacity(election.positions.len());
        for position in &election.positions {
            let candidate_id = choices.remove(position).ok_or_else(|| {
                Error::InvalidBallot(format!("No candidate chosen for '{position}'"))
            })?;
            ordered.push(Choice {
                position: position.clone(),
                candidate_id,
            });
        }

        let ids: Vec<Id> = ordered.iter().map(|choice| choice.candidate_id).collect();
        let candidates = self.store.candidates_by_ids(&ids).await?;
        for choice in &ordered {
            let standing = candidates.iter().any(|candidate| {
                candidate.id == choice.candidate_id
                    && candidate.election_id == election.id
                    && candidate.position == choice.position
            });
            if !standing {
                return Err(Error::InvalidBallot(format!(
                    "Candidate {} is not standing for '{}'",
                    choice.candidate_id, choice.position
                )));
            }
        }

        Ok(ordered)
    }

    async fn notify_ballot_accepted(&self, election: &Election, ballot: &Ballot) {
        let alumnus = match self.store.alumnus_by_student_id(&ballot.voter_id).await {
            Ok(Some(alumnus)) => alumnus,
            Ok(None) => {
                debug!("No directory record for voter {}", ballot.voter_id);
                return;
            }
            Err(err) => {
                debug!("Could not look up voter {}: {err}", ballot.voter_id);
                return;
            }
        };
        let notification = Notification::new(Event::BallotAccepted, alumnus.email.clone())
            .with("election", election.title.clone())
            .with("ballot_id", ballot.id.to_string())
            .with("cast_at", ballot.cast_at.to_rfc3339());
        notify(self.notifier.as_ref(), notification).await;
    }
}
