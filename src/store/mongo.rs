use chrono::{DateTime, Utc};
use log::{debug, warn};
use mongodb::{
    bson::{doc, to_bson, Bson, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, FindOptions, ReplaceOptions, ReturnDocument},
    results::InsertOneResult,
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;

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
    mongodb::{is_duplicate_key_error, is_transient_transaction_error, Coll, Id},
};

use super::{DirectoryStore, VotingStore};

/// How many times a ballot transaction is attempted before giving up.
const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

/// The production store.
///
/// Ballot application runs in a multi-document transaction, so the database
/// must be a replica set.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    elections: Coll<Election>,
    new_elections: Coll<NewElection>,
    candidates: Coll<Candidate>,
    new_candidates: Coll<NewCandidate>,
    ballots: Coll<Ballot>,
    new_ballots: Coll<NewBallot>,
    alumni: Coll<Alumnus>,
    new_alumni: Coll<NewAlumnus>,
    otp_sessions: Coll<OtpSession>,
    admins: Coll<Admin>,
    new_admins: Coll<NewAdmin>,
}

impl MongoStore {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            elections: Coll::from_db(db),
            new_elections: Coll::from_db(db),
            candidates: Coll::from_db(db),
            new_candidates: Coll::from_db(db),
            ballots: Coll::from_db(db),
            new_ballots: Coll::from_db(db),
            alumni: Coll::from_db(db),
            new_alumni: Coll::from_db(db),
            otp_sessions: Coll::from_db(db),
            admins: Coll::from_db(db),
            new_admins: Coll::from_db(db),
        }
    }

    async fn replace_writes(
        &self,
        id: Id,
        election: &NewElection,
        session: &mut ClientSession,
    ) -> Result<Option<Election>> {
        let filter = doc! {
            "_id": id,
            "status": ElectionStatus::Draft,
        };
        let existing = match self
            .elections
            .find_one_with_session(filter.clone(), None, session)
            .await?
        {
            Some(existing) => existing,
            None => return Ok(None),
        };
        if existing.positions != election.positions {
            let registered = self
                .candidates
                .count_documents_with_session(doc! {"election_id": id}, None, session)
                .await?;
            if registered > 0 {
                return Ok(None);
            }
        }
        let update = doc! {
            "$set": {
                "title": &election.title,
                "description": &election.description,
                "positions": &election.positions,
                "start_date": BsonDateTime::from_chrono(election.start_date),
                "end_date": BsonDateTime::from_chrono(election.end_date),
                "eligibility": bson_of(&election.eligibility)?,
                "updated_at": BsonDateTime::from_chrono(election.updated_at),
            }
        };
        Ok(self
            .elections
            .find_one_and_update_with_session(filter, update, after_update(), session)
            .await?)
    }

    async fn candidate_writes(
        &self,
        candidate: &NewCandidate,
        session: &mut ClientSession,
    ) -> Result<Candidate> {
        // Touching the election makes a concurrent position change conflict
        // with this transaction.
        let filter = doc! {
            "_id": candidate.election_id,
            "status": {"$in": [ElectionStatus::Draft, ElectionStatus::Active]},
            "positions": &candidate.position,
        };
        let update = doc! {"$set": {"updated_at": BsonDateTime::from_chrono(candidate.created_at)}};
        let result = self
            .elections
            .update_one_with_session(filter, update, None, session)
            .await?;
        if result.matched_count == 0 {
            let election = self
                .elections
                .find_one_with_session(candidate.election_id.as_doc(), None, session)
                .await?
                .ok_or_else(|| Error::not_found("Election", candidate.election_id))?;
            if election.status.is_terminal() {
                return Err(Error::ElectionClosed(election.status));
            }
            return Err(Error::InvalidPosition {
                election_id: candidate.election_id.to_string(),
                position: candidate.position.clone(),
            });
        }

        let result = self
            .new_candidates
            .insert_one_with_session(candidate, None, session)
            .await?;
        Ok(Candidate {
            id: inserted_id(result)?,
            candidate: candidate.clone(),
        })
    }

    async fn ballot_writes(
        &self,
        ballot: &NewBallot,
        session: &mut ClientSession,
    ) -> Result<Ballot> {
        // The unique index turns a second ballot into a duplicate key error.
        let id = match self
            .new_ballots
            .insert_one_with_session(ballot, None, session)
            .await
        {
            Ok(result) => inserted_id(result)?,
            Err(err) if is_duplicate_key_error(&err) => return Err(Error::AlreadyVoted),
            Err(err) => return Err(err.into()),
        };

        // Count the ballot only if the election is still active.
        let filter = doc! {
            "_id": ballot.election_id,
            "status": ElectionStatus::Active,
        };
        let result = self
            .elections
            .update_one_with_session(filter, doc! {"$inc": {"total_votes": 1}}, None, session)
            .await?;
        if result.matched_count == 0 {
            let election = self
                .elections
                .find_one_with_session(ballot.election_id.as_doc(), None, session)
                .await?
                .ok_or_else(|| Error::not_found("Election", ballot.election_id))?;
            return Err(Error::ElectionNotActive(election.status));
        }

        for choice in &ballot.choices {
            let filter = doc! {
                "_id": choice.candidate_id,
                "election_id": ballot.election_id,
                "position": &choice.position,
            };
            let result = self
                .candidates
                .update_one_with_session(filter, doc! {"$inc": {"votes": 1}}, None, session)
                .await?;
            if result.matched_count != 1 {
                return Err(Error::InvalidBallot(format!(
                    "Candidate {} is not standing for '{}'",
                    choice.candidate_id, choice.position
                )));
            }
        }

        Ok(Ballot {
            id,
            ballot: ballot.clone(),
        })
    }
}

/// Commit the transaction if `outcome` succeeded, otherwise abort it.
async fn finish<T>(session: &mut ClientSession, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            session.commit_transaction().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = session.abort_transaction().await {
                debug!("Abort after failed transaction also failed: {abort_err}");
            }
            Err(err)
        }
    }
}

/// Should a transaction that failed with `err` on `attempt` run again?
fn should_retry(err: &Error, attempt: u32) -> bool {
    match err {
        Error::Db(err) => is_transient_transaction_error(err) && attempt < MAX_TRANSACTION_ATTEMPTS,
        _ => false,
    }
}

/// Extract the generated ID from an insert.
fn inserted_id(result: InsertOneResult) -> Result<Id> {
    result
        .inserted_id
        .as_object_id()
        .map(Id::from)
        .ok_or_else(|| Error::Internal("Inserted document has no ObjectId".to_string()))
}

fn bson_of<T: serde::Serialize>(value: &T) -> Result<Bson> {
    to_bson(value).map_err(|err| Error::Internal(err.to_string()))
}

fn after_update() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

fn newest_first(field: &str) -> FindOptions {
    FindOptions::builder().sort(doc! {field: -1}).build()
}

#[rocket::async_trait]
impl VotingStore for MongoStore {
    async fn insert_election(&self, election: NewElection) -> Result<Election> {
        let result = self.new_elections.insert_one(&election, None).await?;
        Ok(Election {
            id: inserted_id(result)?,
            election,
        })
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        Ok(self.elections.find_one(id.as_doc(), None).await?)
    }

    async fn elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>> {
        let filter = if statuses.is_empty() {
            Document::new()
        } else {
            let statuses: Vec<Bson> = statuses.iter().map(|s| Bson::from(*s)).collect();
            doc! {"status": {"$in": statuses}}
        };
        let cursor = self
            .elections
            .find(filter, newest_first("start_date"))
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn replace_draft_election(
        &self,
        id: Id,
        election: NewElection,
    ) -> Result<Option<Election>> {
        let mut session = self.client.start_session(None).await?;
        let mut attempt = 1;
        loop {
            session.start_transaction(None).await?;
            let outcome = self.replace_writes(id, &election, &mut session).await;
            match finish(&mut session, outcome).await {
                Err(err) if should_retry(&err, attempt) => {
                    warn!("Election update attempt {attempt} hit a transient error: {err}");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn transition_election(
        &self,
        id: Id,
        from: ElectionStatus,
        to: ElectionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Election>> {
        let filter = doc! {
            "_id": id,
            "status": from,
        };
        let update = doc! {
            "$set": {
                "status": to,
                "updated_at": BsonDateTime::from_chrono(now),
            }
        };
        Ok(self
            .elections
            .find_one_and_update(filter, update, after_update())
            .await?)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let mut session = self.client.start_session(None).await?;
        let mut attempt = 1;
        loop {
            session.start_transaction(None).await?;
            let outcome = self.candidate_writes(&candidate, &mut session).await;
            match finish(&mut session, outcome).await {
                Err(err) if should_retry(&err, attempt) => {
                    warn!("Candidate transaction attempt {attempt} hit a transient error: {err}");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>> {
        let cursor = self
            .candidates
            .find(doc! {"election_id": election_id}, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn candidates_by_ids(&self, ids: &[Id]) -> Result<Vec<Candidate>> {
        let ids: Vec<Bson> = ids.iter().map(|id| Bson::from(*id)).collect();
        let cursor = self
            .candidates
            .find(doc! {"_id": {"$in": ids}}, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_candidates(&self, election_id: Id) -> Result<u64> {
        Ok(self
            .candidates
            .count_documents(doc! {"election_id": election_id}, None)
            .await?)
    }

    async fn has_ballot(&self, election_id: Id, voter_id: &str) -> Result<bool> {
        let filter = doc! {
            "election_id": election_id,
            "voter_id": voter_id,
        };
        Ok(self.ballots.find_one(filter, None).await?.is_some())
    }

    async fn apply_ballot(&self, ballot: NewBallot) -> Result<Ballot> {
        let mut session = self.client.start_session(None).await?;
        let mut attempt = 1;
        loop {
            session.start_transaction(None).await?;
            let outcome = self.ballot_writes(&ballot, &mut session).await;
            match finish(&mut session, outcome).await {
                Err(err) if should_retry(&err, attempt) => {
                    warn!("Ballot transaction attempt {attempt} hit a transient error: {err}");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn ballots(&self, election_id: Id) -> Result<Vec<Ballot>> {
        let cursor = self
            .ballots
            .find(doc! {"election_id": election_id}, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

#[rocket::async_trait]
impl DirectoryStore for MongoStore {
    async fn insert_alumnus(&self, alumnus: NewAlumnus) -> Result<Alumnus> {
        match self.new_alumni.insert_one(&alumnus, None).await {
            Ok(result) => Ok(Alumnus {
                id: inserted_id(result)?,
                alumnus,
            }),
            Err(err) if is_duplicate_key_error(&err) => Err(Error::Conflict(format!(
                "Student ID '{}' is already registered",
                alumnus.student_id
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn alumnus(&self, id: Id) -> Result<Option<Alumnus>> {
        Ok(self.alumni.find_one(id.as_doc(), None).await?)
    }

    async fn alumnus_by_student_id(&self, student_id: &str) -> Result<Option<Alumnus>> {
        Ok(self
            .alumni
            .find_one(doc! {"student_id": student_id}, None)
            .await?)
    }

    async fn alumni(&self, status: Option<ApprovalStatus>) -> Result<Vec<Alumnus>> {
        let filter = status.map(|status| doc! {"status": status});
        let cursor = self
            .alumni
            .find(filter, newest_first("registered_at"))
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn set_alumnus_status(
        &self,
        id: Id,
        status: ApprovalStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Alumnus>> {
        let update = doc! {
            "$set": {
                "status": status,
                "status_reason": reason,
                "updated_at": BsonDateTime::from_chrono(now),
            }
        };
        Ok(self
            .alumni
            .find_one_and_update(id.as_doc(), update, after_update())
            .await?)
    }

    async fn insert_otp(&self, session: OtpSession) -> Result<()> {
        let filter = doc! {"student_id": session.student_id.clone()};
        let upsert = ReplaceOptions::builder().upsert(true).build();
        self.otp_sessions
            .replace_one(filter, &session, upsert)
            .await?;
        Ok(())
    }

    async fn redeem_otp(
        &self,
        student_id: &str,
        code_hmac: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let live = doc! {
            "student_id": student_id,
            "used": false,
            "attempts": {"$lt": OtpSession::MAX_ATTEMPTS},
            "expire_at": {"$gt": BsonDateTime::from_chrono(now)},
        };
        let mut matching = live.clone();
        matching.insert("code_hmac", code_hmac);
        let redeemed = self
            .otp_sessions
            .find_one_and_update(matching, doc! {"$set": {"used": true}}, None)
            .await?;
        if redeemed.is_some() {
            return Ok(true);
        }
        self.otp_sessions
            .update_one(live, doc! {"$inc": {"attempts": 1}}, None)
            .await?;
        Ok(false)
    }

    async fn admin(&self, id: Id) -> Result<Option<Admin>> {
        Ok(self.admins.find_one(id.as_doc(), None).await?)
    }

    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        Ok(self
            .admins
            .find_one(doc! {"username": username}, None)
            .await?)
    }

    async fn insert_admin(&self, admin: NewAdmin) -> Result<Admin> {
        match self.new_admins.insert_one(&admin, None).await {
            Ok(result) => Ok(Admin {
                id: inserted_id(result)?,
                admin,
            }),
            Err(err) if is_duplicate_key_error(&err) => Err(Error::Conflict(format!(
                "Username '{}' is taken",
                admin.username
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn count_admins(&self) -> Result<u64> {
        Ok(self.admins.count_documents(None, None).await?)
    }

    async fn record_admin_login(&self, id: Id, now: DateTime<Utc>) -> Result<()> {
        self.admins
            .update_one(
                id.as_doc(),
                doc! {"$set": {"last_login": BsonDateTime::from_chrono(now)}},
                None,
            )
            .await?;
        Ok(())
    }
}
