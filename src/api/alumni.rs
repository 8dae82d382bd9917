use std::net::IpAddr;

use rocket::{http::Status, serde::json::Json, Route, State};

use crate::{
    directory::IdentityDirectory,
    engine::VotingEngine,
    error::{Error, Result},
    model::{
        api::{
            alumnus::{AlumnusDescription, Registration},
            ballot::{BallotSpec, Receipt, VotedStatus},
            candidate::CandidateDescription,
            election::ElectionDescription,
        },
        common::election::ElectionStatus,
        db::{alumnus::Alumnus, election::Election},
        mongodb::Id,
    },
};

/// What alumni see when they don't ask for anything specific.
const DEFAULT_LISTING: [ElectionStatus; 2] = [ElectionStatus::Active, ElectionStatus::Completed];

pub fn routes() -> Vec<Route> {
    routes![
        register,
        profile,
        elections,
        candidates,
        has_voted,
        submit_ballot
    ]
}

#[post("/alumni", data = "<registration>", format = "json")]
async fn register(
    registration: Json<Registration>,
    directory: &State<IdentityDirectory>,
) -> Result<(Status, Json<AlumnusDescription>)> {
    let alumnus = directory.register(registration.into_inner()).await?;
    Ok((Status::Created, Json(alumnus.into())))
}

#[get("/alumni/me")]
async fn profile(alumnus: Alumnus) -> Json<AlumnusDescription> {
    Json(alumnus.into())
}

#[get("/alumni/elections?<status>")]
async fn elections(
    alumnus: Alumnus,
    status: Vec<ElectionStatus>,
    engine: &State<VotingEngine>,
) -> Result<Json<Vec<ElectionDescription>>> {
    // Drafts are never shown to alumni.
    let mut statuses: Vec<_> = status
        .into_iter()
        .filter(|s| *s != ElectionStatus::Draft)
        .collect();
    if statuses.is_empty() {
        statuses = DEFAULT_LISTING.to_vec();
    }
    let elections = engine
        .eligible_elections(&alumnus.voter(), &statuses)
        .await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/alumni/elections/<election_id>/candidates")]
async fn candidates(
    alumnus: Alumnus,
    election_id: Id,
    engine: &State<VotingEngine>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let election = visible_election(engine, &alumnus, election_id).await?;
    let show_tally = election.status == ElectionStatus::Completed;
    let candidates = engine
        .list_candidates(election_id)
        .await?
        .into_iter()
        .map(|candidate| {
            if show_tally {
                candidate.into()
            } else {
                CandidateDescription::without_tally(candidate)
            }
        })
        .collect();
    Ok(Json(candidates))
}

#[get("/alumni/elections/<election_id>/voted")]
async fn has_voted(
    alumnus: Alumnus,
    election_id: Id,
    engine: &State<VotingEngine>,
) -> Result<Json<VotedStatus>> {
    let has_voted = engine.has_voted(&alumnus.student_id, election_id).await?;
    Ok(Json(VotedStatus { has_voted }))
}

#[post("/alumni/elections/<election_id>/ballot", data = "<ballot>", format = "json")]
async fn submit_ballot(
    alumnus: Alumnus,
    election_id: Id,
    ballot: Json<BallotSpec>,
    client_ip: Option<IpAddr>,
    engine: &State<VotingEngine>,
) -> Result<(Status, Json<Receipt>)> {
    let ballot = engine
        .submit_ballot(
            &alumnus.voter(),
            election_id,
            ballot.choices(),
            client_ip.map(|ip| ip.to_string()),
        )
        .await?;
    Ok((Status::Created, Json(ballot.into())))
}

/// An election this alumnus is allowed to look at.
async fn visible_election(
    engine: &VotingEngine,
    alumnus: &Alumnus,
    election_id: Id,
) -> Result<Election> {
    let election = engine.election(election_id).await?;
    if election.status == ElectionStatus::Draft {
        return Err(Error::not_found("Election", election_id));
    }
    if !alumnus.voter().is_eligible(&election.eligibility) {
        return Err(Error::NotEligible(format!(
            "Not eligible for election {election_id}"
        )));
    }
    Ok(election)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rocket::{
        http::ContentType,
        local::asynchronous::Client,
        serde::json::{json, serde_json},
    };

    use super::*;
    use crate::model::{
        api::{candidate::CandidateSpec, election::ElectionSpec, id::ApiId},
        common::alumnus::ApprovalStatus,
        db::{
            candidate::{Candidate, CandidateCore},
            election::ElectionCore,
        },
    };
    use crate::notify::{Event, RecordingNotifier};
    use crate::store::{MemoryStore, VotingStore};

    /// An active election with C1, C2 for President and C3 for Treasurer.
    async fn election(store: &MemoryStore, spec: ElectionSpec) -> (Election, Vec<Candidate>) {
        let mut core = spec.into_election(chrono::Utc::now());
        core.status = ElectionStatus::Active;
        let election = store.insert_election(core).await.unwrap();
        let mut candidates = Vec::new();
        for (position, name) in [
            ("President", "Chidi Obi"),
            ("President", "Amara Nwosu"),
            ("Treasurer", "Kemi Adeyemi"),
        ] {
            let spec = CandidateSpec::example(position, name);
            candidates.push(
                store
                    .insert_candidate(spec.into_candidate(election.id, chrono::Utc::now()))
                    .await
                    .unwrap(),
            );
        }
        (election, candidates)
    }

    fn ballot(candidates: &[Candidate]) -> String {
        let spec = BallotSpec {
            votes: HashMap::from([
                ("President".to_string(), ApiId::from(candidates[0].id)),
                ("Treasurer".to_string(), ApiId::from(candidates[2].id)),
            ]),
        };
        json!(spec).to_string()
    }

    #[backend_test]
    async fn registration_creates_pending_alumnus(client: Client, notifier: RecordingNotifier) {
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(Registration::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let raw = response.into_string().await.unwrap();
        let alumnus: AlumnusDescription = serde_json::from_str(&raw).unwrap();
        assert_eq!(alumnus.status, ApprovalStatus::Pending);
        // The verification code is only ever sent by email.
        assert!(!raw.contains("verification_code"));
        assert_eq!(notifier.sent_of(Event::RegistrationReceived).len(), 1);

        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(Registration::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test]
    async fn signed_out_requests_are_unauthorized(client: Client) {
        let response = client.get(uri!(profile)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let response = client.get("/alumni/elections").dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(alumni)]
    async fn vote_once(client: Client, store: MemoryStore) {
        let (election, candidates) = election(&store, ElectionSpec::current_example()).await;

        let response = client
            .get(uri!(has_voted(election.id)))
            .dispatch()
            .await;
        let status: VotedStatus =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!status.has_voted);

        let response = client
            .post(uri!(submit_ballot(election.id)))
            .header(ContentType::JSON)
            .body(ballot(&candidates))
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let receipt: Receipt =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(*receipt.election_id, election.id);
        assert_eq!(receipt.voter_id, "BU/2015/0421");

        let response = client
            .post(uri!(submit_ballot(election.id)))
            .header(ContentType::JSON)
            .body(ballot(&candidates))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        let body: serde_json::Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["error"], "already_voted");

        let response = client
            .get(uri!(has_voted(election.id)))
            .dispatch()
            .await;
        let status: VotedStatus =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(status.has_voted);

        let stored = store.election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.total_votes, 1);
    }

    #[backend_test(alumni)]
    async fn incomplete_ballot_is_unprocessable(client: Client, store: MemoryStore) {
        let (election, candidates) = election(&store, ElectionSpec::current_example()).await;
        let body = json!({"votes": {"President": candidates[0].id.to_string()}}).to_string();
        let response = client
            .post(uri!(submit_ballot(election.id)))
            .header(ContentType::JSON)
            .body(body)
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
        let stored = store.election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.total_votes, 0);
    }

    #[backend_test(alumni)]
    async fn listing_hides_drafts_and_ineligible(client: Client, store: MemoryStore) {
        let (open, _) = election(&store, ElectionSpec::current_example()).await;
        let mut business = ElectionSpec::current_example();
        business.eligible_schools = vec!["School of Business".to_string()];
        let (business, _) = election(&store, business).await;
        let draft = store
            .insert_election(ElectionCore::draft_example())
            .await
            .unwrap();

        let response = client.get("/alumni/elections").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let listed: Vec<ElectionDescription> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let ids: Vec<_> = listed.iter().map(|e| *e.id).collect();
        assert_eq!(ids, vec![open.id]);

        let response = client
            .get("/alumni/elections?status=draft")
            .dispatch()
            .await;
        let listed: Vec<ElectionDescription> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!listed.iter().any(|e| *e.id == draft.id));

        let response = client
            .get(uri!(candidates(business.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client.get(uri!(candidates(draft.id))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(alumni)]
    async fn tallies_hidden_until_completed(client: Client, store: MemoryStore) {
        let (election, _) = election(&store, ElectionSpec::current_example()).await;
        store
            .insert_candidate({
                let mut candidate = CandidateCore::example(election.id, "Treasurer");
                candidate.votes = 3;
                candidate
            })
            .await
            .unwrap();

        let response = client.get(uri!(candidates(election.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let listed: Vec<CandidateDescription> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(listed.len(), 4);
        assert!(listed.iter().all(|c| c.votes.is_none()));

        store
            .transition_election(
                election.id,
                ElectionStatus::Active,
                ElectionStatus::Completed,
                chrono::Utc::now(),
            )
            .await
            .unwrap();
        let response = client.get(uri!(candidates(election.id))).dispatch().await;
        let listed: Vec<CandidateDescription> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(listed.iter().any(|c| c.votes == Some(3)));
    }
}
