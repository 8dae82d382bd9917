use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use rocket::tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{
    common::{alumnus::ApprovalStatus, election::ElectionStatus},
    db::{
        admin::{Admin, NewAdmin},
        alumnus::{Alumnus, NewAlumnus},
        ballot::{Ballot, NewBallot},
        candidate::{Candidate, NewCandidate},
        election::{Election, NewElection},
        otp::OtpSession,
    },
    mongodb::Id,
};

use super::{DirectoryStore, VotingStore};

#[derive(Default)]
struct State {
    elections: Vec<Election>,
    candidates: Vec<Candidate>,
    ballots: Vec<Ballot>,
    alumni: Vec<Alumnus>,
    otp_sessions: Vec<OtpSession>,
    admins: Vec<Admin>,
}

/// An in-process store. Every operation holds one lock for its whole
/// duration, so multi-record updates are atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[cfg(test)]
impl MemoryStore {
    /// Append a ballot to the log without touching any counter.
    pub async fn insert_raw_ballot(&self, ballot: NewBallot) -> Ballot {
        let ballot = Ballot {
            id: Id::new(),
            ballot,
        };
        self.state.lock().await.ballots.push(ballot.clone());
        ballot
    }
}

#[rocket::async_trait]
impl VotingStore for MemoryStore {
    async fn insert_election(&self, election: NewElection) -> Result<Election> {
        let election = Election {
            id: Id::new(),
            election,
        };
        self.state.lock().await.elections.push(election.clone());
        Ok(election)
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        let state = self.state.lock().await;
        Ok(state.elections.iter().find(|e| e.id == id).cloned())
    }

    async fn elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>> {
        let state = self.state.lock().await;
        let mut elections: Vec<_> = state
            .elections
            .iter()
            .filter(|e| statuses.is_empty() || statuses.contains(&e.status))
            .cloned()
            .collect();
        elections.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(elections)
    }

    async fn replace_draft_election(
        &self,
        id: Id,
        election: NewElection,
    ) -> Result<Option<Election>> {
        let mut state = self.state.lock().await;
        let State {
            elections,
            candidates,
            ..
        } = &mut *state;
        let existing = elections
            .iter_mut()
            .find(|e| e.id == id && e.status == ElectionStatus::Draft)
            .filter(|e| {
                e.positions == election.positions
                    || !candidates.iter().any(|c| c.election_id == id)
            });
        Ok(existing.map(|existing| {
            existing.title = election.title;
            existing.description = election.description;
            existing.positions = election.positions;
            existing.start_date = election.start_date;
            existing.end_date = election.end_date;
            existing.eligibility = election.eligibility;
            existing.updated_at = election.updated_at;
            existing.clone()
        }))
    }

    async fn transition_election(
        &self,
        id: Id,
        from: ElectionStatus,
        to: ElectionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Election>> {
        let mut state = self.state.lock().await;
        let existing = state
            .elections
            .iter_mut()
            .find(|e| e.id == id && e.status == from);
        Ok(existing.map(|existing| {
            existing.status = to;
            existing.updated_at = now;
            existing.clone()
        }))
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let mut state = self.state.lock().await;
        let election = state
            .elections
            .iter()
            .find(|e| e.id == candidate.election_id)
            .ok_or_else(|| Error::not_found("Election", candidate.election_id))?;
        if election.status.is_terminal() {
            return Err(Error::ElectionClosed(election.status));
        }
        if !election.has_position(&candidate.position) {
            return Err(Error::InvalidPosition {
                election_id: candidate.election_id.to_string(),
                position: candidate.position,
            });
        }
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        state.candidates.push(candidate.clone());
        Ok(candidate)
    }

    async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>> {
        let state = self.state.lock().await;
        Ok(state
            .candidates
            .iter()
            .filter(|c| c.election_id == election_id)
            .cloned()
            .collect())
    }

    async fn candidates_by_ids(&self, ids: &[Id]) -> Result<Vec<Candidate>> {
        let state = self.state.lock().await;
        Ok(state
            .candidates
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn count_candidates(&self, election_id: Id) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state
            .candidates
            .iter()
            .filter(|c| c.election_id == election_id)
            .count() as u64)
    }

    async fn has_ballot(&self, election_id: Id, voter_id: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .ballots
            .iter()
            .any(|b| b.election_id == election_id && b.voter_id == voter_id))
    }

    async fn apply_ballot(&self, ballot: NewBallot) -> Result<Ballot> {
        let mut state = self.state.lock().await;

        // Validate everything before touching anything.
        if state
            .ballots
            .iter()
            .any(|b| b.election_id == ballot.election_id && b.voter_id == ballot.voter_id)
        {
            return Err(Error::AlreadyVoted);
        }
        let election_idx = state
            .elections
            .iter()
            .position(|e| e.id == ballot.election_id)
            .ok_or_else(|| Error::not_found("Election", ballot.election_id))?;
        let status = state.elections[election_idx].status;
        if status != ElectionStatus::Active {
            return Err(Error::ElectionNotActive(status));
        }
        let mut candidate_idxs = Vec::with_capacity(ballot.choices.len());
        for choice in &ballot.choices {
            let idx = state
                .candidates
                .iter()
                .position(|c| {
                    c.id == choice.candidate_id
                        && c.election_id == ballot.election_id
                        && c.position == choice.position
                })
                .ok_or_else(|| {
                    Error::InvalidBallot(format!(
                        "Candidate {} is not standing for '{}'",
                        choice.candidate_id, choice.position
                    ))
                })?;
            candidate_idxs.push(idx);
        }

        // Apply.
        for idx in candidate_idxs {
            state.candidates[idx].votes += 1;
        }
        state.elections[election_idx].total_votes += 1;
        let ballot = Ballot {
            id: Id::new(),
            ballot,
        };
        state.ballots.push(ballot.clone());
        Ok(ballot)
    }

    async fn ballots(&self, election_id: Id) -> Result<Vec<Ballot>> {
        let state = self.state.lock().await;
        Ok(state
            .ballots
            .iter()
            .filter(|b| b.election_id == election_id)
            .cloned()
            .collect())
    }
}

#[rocket::async_trait]
impl DirectoryStore for MemoryStore {
    async fn insert_alumnus(&self, alumnus: NewAlumnus) -> Result<Alumnus> {
        let mut state = self.state.lock().await;
        if state
            .alumni
            .iter()
            .any(|a| a.student_id == alumnus.student_id)
        {
            return Err(Error::Conflict(format!(
                "Student ID '{}' is already registered",
                alumnus.student_id
            )));
        }
        let alumnus = Alumnus {
            id: Id::new(),
            alumnus,
        };
        state.alumni.push(alumnus.clone());
        Ok(alumnus)
    }

    async fn alumnus(&self, id: Id) -> Result<Option<Alumnus>> {
        let state = self.state.lock().await;
        Ok(state.alumni.iter().find(|a| a.id == id).cloned())
    }

    async fn alumnus_by_student_id(&self, student_id: &str) -> Result<Option<Alumnus>> {
        let state = self.state.lock().await;
        Ok(state
            .alumni
            .iter()
            .find(|a| a.student_id == student_id)
            .cloned())
    }

    async fn alumni(&self, status: Option<ApprovalStatus>) -> Result<Vec<Alumnus>> {
        let state = self.state.lock().await;
        let mut alumni: Vec<_> = state
            .alumni
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        alumni.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        Ok(alumni)
    }

    async fn set_alumnus_status(
        &self,
        id: Id,
        status: ApprovalStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Alumnus>> {
        let mut state = self.state.lock().await;
        Ok(state.alumni.iter_mut().find(|a| a.id == id).map(|alumnus| {
            alumnus.status = status;
            alumnus.status_reason = reason;
            alumnus.updated_at = now;
            alumnus.clone()
        }))
    }

    async fn insert_otp(&self, session: OtpSession) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .otp_sessions
            .retain(|s| s.student_id != session.student_id);
        state.otp_sessions.push(session);
        Ok(())
    }

    async fn redeem_otp(
        &self,
        student_id: &str,
        code_hmac: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let session = state
            .otp_sessions
            .iter_mut()
            .find(|s| s.student_id == student_id && s.live(now));
        Ok(match session {
            Some(session) if session.code_hmac == code_hmac => {
                session.used = true;
                true
            }
            Some(session) => {
                session.attempts += 1;
                false
            }
            None => false,
        })
    }

    async fn admin(&self, id: Id) -> Result<Option<Admin>> {
        let state = self.state.lock().await;
        Ok(state.admins.iter().find(|a| a.id == id).cloned())
    }

    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let state = self.state.lock().await;
        Ok(state
            .admins
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn insert_admin(&self, admin: NewAdmin) -> Result<Admin> {
        let mut state = self.state.lock().await;
        if state.admins.iter().any(|a| a.username == admin.username) {
            return Err(Error::Conflict(format!(
                "Username '{}' is taken",
                admin.username
            )));
        }
        let admin = Admin {
            id: Id::new(),
            admin,
        };
        state.admins.push(admin.clone());
        Ok(admin)
    }

    async fn count_admins(&self) -> Result<u64> {
        Ok(self.state.lock().await.admins.len() as u64)
    }

    async fn record_admin_login(&self, id: Id, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(admin) = state.admins.iter_mut().find(|a| a.id == id) {
            admin.last_login = Some(BsonDateTime::from_chrono(now));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::db::{
        alumnus::AlumnusCore, ballot::Choice, candidate::CandidateCore, election::ElectionCore,
    };

    #[rocket::async_test]
    async fn rejected_ballot_changes_nothing() {
        let store = MemoryStore::default();
        let election = store
            .insert_election(ElectionCore::active_example())
            .await
            .unwrap();
        let president = store
            .insert_candidate(CandidateCore::example(election.id, "President"))
            .await
            .unwrap();

        let ballot = NewBallot {
            election_id: election.id,
            voter_id: "BU/2015/0421".to_string(),
            choices: vec![
                Choice {
                    position: "President".to_string(),
                    candidate_id: president.id,
                },
                Choice {
                    position: "Treasurer".to_string(),
                    candidate_id: Id::new(),
                },
            ],
            cast_at: Utc::now(),
            origin: None,
        };
        assert!(matches!(
            store.apply_ballot(ballot).await,
            Err(Error::InvalidBallot(_))
        ));

        let president = store.candidates_by_ids(&[president.id]).await.unwrap();
        assert_eq!(president[0].votes, 0);
        assert_eq!(
            store.election(election.id).await.unwrap().unwrap().total_votes,
            0
        );
        assert!(store.ballots(election.id).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn transition_is_compare_and_set() {
        let store = MemoryStore::default();
        let election = store
            .insert_election(ElectionCore::draft_example())
            .await
            .unwrap();
        let now = Utc::now();
        let first = store
            .transition_election(election.id, ElectionStatus::Draft, ElectionStatus::Active, now)
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, ElectionStatus::Active);
        let second = store
            .transition_election(
                election.id,
                ElectionStatus::Draft,
                ElectionStatus::Cancelled,
                now,
            )
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[rocket::async_test]
    async fn otp_sessions_redeem_once() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let expire_at = now + Duration::minutes(10);
        store
            .insert_otp(OtpSession::new("BU/2015/0421".to_string(), "abc".to_string(), expire_at))
            .await
            .unwrap();
        assert!(!store.redeem_otp("BU/2015/0421", "xyz", now).await.unwrap());
        assert!(!store
            .redeem_otp("BU/2015/0421", "abc", now + Duration::minutes(11))
            .await
            .unwrap());
        assert!(store.redeem_otp("BU/2015/0421", "abc", now).await.unwrap());
        assert!(!store.redeem_otp("BU/2015/0421", "abc", now).await.unwrap());
    }

    #[rocket::async_test]
    async fn new_otp_replaces_the_old_one() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let expire_at = now + Duration::minutes(10);
        store
            .insert_otp(OtpSession::new("BU/2015/0421".to_string(), "old".to_string(), expire_at))
            .await
            .unwrap();
        store
            .insert_otp(OtpSession::new("BU/2015/0421".to_string(), "new".to_string(), expire_at))
            .await
            .unwrap();
        assert!(!store.redeem_otp("BU/2015/0421", "old", now).await.unwrap());
        assert!(store.redeem_otp("BU/2015/0421", "new", now).await.unwrap());
    }

    #[rocket::async_test]
    async fn too_many_wrong_codes_burn_the_session() {
        let store = MemoryStore::default();
        let now = Utc::now();
        store
            .insert_otp(OtpSession::new(
                "BU/2015/0421".to_string(),
                "abc".to_string(),
                now + Duration::minutes(10),
            ))
            .await
            .unwrap();
        for _ in 0..OtpSession::MAX_ATTEMPTS {
            assert!(!store.redeem_otp("BU/2015/0421", "xyz", now).await.unwrap());
        }
        assert!(!store.redeem_otp("BU/2015/0421", "abc", now).await.unwrap());
    }

    #[rocket::async_test]
    async fn duplicate_student_ids_conflict() {
        let store = MemoryStore::default();
        store
            .insert_alumnus(AlumnusCore::approved_example())
            .await
            .unwrap();
        assert!(matches!(
            store.insert_alumnus(AlumnusCore::approved_example()).await,
            Err(Error::Conflict(_))
        ));
    }

    #[rocket::async_test]
    async fn positions_stay_put_once_candidates_exist() {
        let store = MemoryStore::default();
        let election = store
            .insert_election(ElectionCore::draft_example())
            .await
            .unwrap();

        let mut renamed = election.election.clone();
        renamed.title = "Renamed".to_string();
        let mut more_positions = renamed.clone();
        more_positions.positions.push("Secretary".to_string());

        store
            .insert_candidate(CandidateCore::example(election.id, "President"))
            .await
            .unwrap();
        assert!(store
            .replace_draft_election(election.id, more_positions)
            .await
            .unwrap()
            .is_none());
        let updated = store
            .replace_draft_election(election.id, renamed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.positions, election.positions);
    }

    #[rocket::async_test]
    async fn candidates_need_an_open_election_with_their_position() {
        let store = MemoryStore::default();
        let election = store
            .insert_election(ElectionCore::draft_example())
            .await
            .unwrap();

        assert!(matches!(
            store
                .insert_candidate(CandidateCore::example(election.id, "Secretary"))
                .await,
            Err(Error::InvalidPosition { .. })
        ));
        assert!(matches!(
            store
                .insert_candidate(CandidateCore::example(Id::new(), "President"))
                .await,
            Err(Error::NotFound(_))
        ));

        store
            .transition_election(
                election.id,
                ElectionStatus::Draft,
                ElectionStatus::Cancelled,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(matches!(
            store
                .insert_candidate(CandidateCore::example(election.id, "President"))
                .await,
            Err(Error::ElectionClosed(ElectionStatus::Cancelled))
        ));
        assert!(store.candidates(election.id).await.unwrap().is_empty());
    }
}
