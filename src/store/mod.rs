//! Persistence behind the voting engine and identity directory.
//!
//! [`MongoStore`] is the production backend. [`MemoryStore`] keeps everything
//! behind a single lock and backs the test suite.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::error::Result;
use crate::model::{
    api::admin::AdminCredentials,
    common::{alumnus::ApprovalStatus, election::ElectionStatus},
    db::{
        admin::{Admin, NewAdmin, DEFAULT_ADMIN_USERNAME},
        alumnus::{Alumnus, NewAlumnus},
        ballot::{Ballot, NewBallot},
        candidate::{Candidate, NewCandidate},
        election::{Election, NewElection},
        otp::OtpSession,
    },
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Elections, candidates and ballots.
#[rocket::async_trait]
pub trait VotingStore: Send + Sync {
    async fn insert_election(&self, election: NewElection) -> Result<Election>;

    async fn election(&self, id: Id) -> Result<Option<Election>>;

    /// Elections with any of the given statuses, newest start first.
    /// An empty filter matches every election.
    async fn elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>>;

    /// Replace an election's specification, but only while it is a draft
    /// and, if the positions change, only while it has no candidates.
    /// Counters and timestamps other than `updated_at` are preserved.
    async fn replace_draft_election(
        &self,
        id: Id,
        election: NewElection,
    ) -> Result<Option<Election>>;

    /// Move an election from `from` to `to`, if it is still in `from`.
    /// Returns the updated election, or `None` if no election matched.
    async fn transition_election(
        &self,
        id: Id,
        from: ElectionStatus,
        to: ElectionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Election>>;

    /// Register a candidate, provided its election is not finished and
    /// lists the candidate's position.
    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate>;

    async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>>;

    async fn candidates_by_ids(&self, ids: &[Id]) -> Result<Vec<Candidate>>;

    async fn count_candidates(&self, election_id: Id) -> Result<u64>;

    async fn has_ballot(&self, election_id: Id, voter_id: &str) -> Result<bool>;

    /// Store a ballot and apply its counts, all or nothing.
    ///
    /// Fails with `AlreadyVoted` if the voter already has a ballot for the
    /// election, and with `ElectionNotActive` if the election stopped being
    /// active since it was checked. Nothing is written on failure.
    async fn apply_ballot(&self, ballot: NewBallot) -> Result<Ballot>;

    async fn ballots(&self, election_id: Id) -> Result<Vec<Ballot>>;
}

/// Alumni, sign-in sessions and administrators.
#[rocket::async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Fails with `Conflict` if the student ID is already registered.
    async fn insert_alumnus(&self, alumnus: NewAlumnus) -> Result<Alumnus>;

    async fn alumnus(&self, id: Id) -> Result<Option<Alumnus>>;

    async fn alumnus_by_student_id(&self, student_id: &str) -> Result<Option<Alumnus>>;

    /// Alumni, newest registration first, optionally filtered by status.
    async fn alumni(&self, status: Option<ApprovalStatus>) -> Result<Vec<Alumnus>>;

    async fn set_alumnus_status(
        &self,
        id: Id,
        status: ApprovalStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Alumnus>>;

    /// Store a session, replacing any earlier one for the same student.
    async fn insert_otp(&self, session: OtpSession) -> Result<()>;

    /// Redeem the student's live session if `code_hmac` matches it.
    ///
    /// Returns whether it was redeemed. At most one caller can redeem a
    /// session, and a mismatch counts towards [`OtpSession::MAX_ATTEMPTS`].
    async fn redeem_otp(&self, student_id: &str, code_hmac: &str, now: DateTime<Utc>)
        -> Result<bool>;

    async fn admin(&self, id: Id) -> Result<Option<Admin>>;

    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>>;

    /// Fails with `Conflict` if the username is taken.
    async fn insert_admin(&self, admin: NewAdmin) -> Result<Admin>;

    async fn count_admins(&self) -> Result<u64>;

    async fn record_admin_login(&self, id: Id, now: DateTime<Utc>) -> Result<()>;
}

/// Everything the application persists.
pub trait Store: VotingStore + DirectoryStore {}

impl<T> Store for T where T: VotingStore + DirectoryStore {}

pub type SharedStore = Arc<dyn Store>;

/// Ensure at least one admin exists, creating the default admin if not.
pub async fn ensure_admin_exists(store: &dyn Store, default_password: &str) -> Result<()> {
    if store.count_admins().await? > 0 {
        return Ok(());
    }
    warn!("No admins found, creating default admin '{DEFAULT_ADMIN_USERNAME}'");
    let credentials = AdminCredentials {
        username: DEFAULT_ADMIN_USERNAME.to_string(),
        password: default_password.to_string(),
    };
    let admin = store.insert_admin(NewAdmin::try_from(credentials)?).await?;
    info!("Created default admin {}", admin.id);
    Ok(())
}
