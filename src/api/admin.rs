use rocket::{http::Status, serde::json::Json, Route, State};

use crate::{
    directory::{AlumniManager, IdentityDirectory, VotingManager},
    engine::VotingEngine,
    error::Result,
    model::{
        api::{
            alumnus::{AlumniStats, AlumnusDescription, Decision},
            candidate::{CandidateDescription, CandidateSpec},
            election::{ElectionDescription, ElectionSpec, StatusUpdate},
            results::{ElectionResults, TallyAudit},
        },
        common::{alumnus::ApprovalStatus, election::ElectionStatus},
        mongodb::Id,
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        list_alumni,
        alumni_stats,
        get_alumnus,
        approve_alumnus,
        reject_alumnus,
        list_elections,
        create_election,
        get_election,
        update_election,
        update_election_status,
        add_candidate,
        list_candidates,
        results,
        audit,
    ]
}

#[get("/admin/alumni?<status>")]
async fn list_alumni(
    _manager: AlumniManager,
    status: Option<ApprovalStatus>,
    directory: &State<IdentityDirectory>,
) -> Result<Json<Vec<AlumnusDescription>>> {
    let alumni = directory.list_alumni(status).await?;
    Ok(Json(alumni.into_iter().map(Into::into).collect()))
}

#[get("/admin/alumni/stats")]
async fn alumni_stats(
    _manager: AlumniManager,
    directory: &State<IdentityDirectory>,
) -> Result<Json<AlumniStats>> {
    Ok(Json(directory.stats().await?))
}

#[get("/admin/alumni/<alumnus_id>")]
async fn get_alumnus(
    _manager: AlumniManager,
    alumnus_id: Id,
    directory: &State<IdentityDirectory>,
) -> Result<Json<AlumnusDescription>> {
    Ok(Json(directory.alumnus(alumnus_id).await?.into()))
}

#[post("/admin/alumni/<alumnus_id>/approve", data = "<decision>")]
async fn approve_alumnus(
    _manager: AlumniManager,
    alumnus_id: Id,
    decision: Option<Json<Decision>>,
    directory: &State<IdentityDirectory>,
) -> Result<Json<AlumnusDescription>> {
    let reason = decision.and_then(|d| d.into_inner().reason);
    Ok(Json(directory.approve(alumnus_id, reason).await?.into()))
}

#[post("/admin/alumni/<alumnus_id>/reject", data = "<decision>", format = "json")]
async fn reject_alumnus(
    _manager: AlumniManager,
    alumnus_id: Id,
    decision: Json<Decision>,
    directory: &State<IdentityDirectory>,
) -> Result<Json<AlumnusDescription>> {
    let reason = decision.into_inner().reason;
    Ok(Json(directory.reject(alumnus_id, reason).await?.into()))
}

#[get("/admin/elections?<status>")]
async fn list_elections(
    _manager: VotingManager,
    status: Vec<ElectionStatus>,
    engine: &State<VotingEngine>,
) -> Result<Json<Vec<ElectionDescription>>> {
    let elections = engine.list_elections(&status).await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[post("/admin/elections", data = "<spec>", format = "json")]
async fn create_election(
    _manager: VotingManager,
    spec: Json<ElectionSpec>,
    engine: &State<VotingEngine>,
) -> Result<(Status, Json<ElectionDescription>)> {
    let election = engine.create_election(spec.into_inner()).await?;
    Ok((Status::Created, Json(election.into())))
}

#[get("/admin/elections/<election_id>")]
async fn get_election(
    _manager: VotingManager,
    election_id: Id,
    engine: &State<VotingEngine>,
) -> Result<Json<ElectionDescription>> {
    Ok(Json(engine.election(election_id).await?.into()))
}

#[put("/admin/elections/<election_id>", data = "<spec>", format = "json")]
async fn update_election(
    _manager: VotingManager,
    election_id: Id,
    spec: Json<ElectionSpec>,
    engine: &State<VotingEngine>,
) -> Result<Json<ElectionDescription>> {
    let election = engine
        .update_election(election_id, spec.into_inner())
        .await?;
    Ok(Json(election.into()))
}

#[put("/admin/elections/<election_id>/status", data = "<update>", format = "json")]
async fn update_election_status(
    _manager: VotingManager,
    election_id: Id,
    update: Json<StatusUpdate>,
    engine: &State<VotingEngine>,
) -> Result<Json<ElectionDescription>> {
    let election = engine
        .update_election_status(election_id, update.status)
        .await?;
    Ok(Json(election.into()))
}

#[post("/admin/elections/<election_id>/candidates", data = "<spec>", format = "json")]
async fn add_candidate(
    _manager: VotingManager,
    election_id: Id,
    spec: Json<CandidateSpec>,
    engine: &State<VotingEngine>,
) -> Result<(Status, Json<CandidateDescription>)> {
    let candidate = engine.add_candidate(election_id, spec.into_inner()).await?;
    Ok((Status::Created, Json(candidate.into())))
}

#[get("/admin/elections/<election_id>/candidates")]
async fn list_candidates(
    _manager: VotingManager,
    election_id: Id,
    engine: &State<VotingEngine>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let candidates = engine.list_candidates(election_id).await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

#[get("/admin/elections/<election_id>/results")]
async fn results(
    _manager: VotingManager,
    election_id: Id,
    engine: &State<VotingEngine>,
) -> Result<Json<ElectionResults>> {
    Ok(Json(engine.results(election_id).await?))
}

#[get("/admin/elections/<election_id>/audit")]
async fn audit(
    _manager: VotingManager,
    election_id: Id,
    engine: &State<VotingEngine>,
) -> Result<Json<TallyAudit>> {
    Ok(Json(engine.audit_tally(election_id).await?))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType,
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json, serde_json},
    };
    use serde::de::DeserializeOwned;

    use super::*;
    use crate::model::{
        api::{
            admin::{AdminCredentials, AdminDescription},
            alumnus::Registration,
            id::ApiId,
        },
        common::admin::{AdminRole, Permission},
        db::{admin::NewAdmin, alumnus::AlumnusCore},
    };
    use crate::notify::{Event, RecordingNotifier};
    use crate::store::{DirectoryStore, MemoryStore};

    async fn body<T: DeserializeOwned>(response: LocalResponse<'_>) -> T {
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    async fn create(client: &Client, spec: &ElectionSpec) -> ElectionDescription {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        body(response).await
    }

    async fn set_status(client: &Client, id: Id, status: ElectionStatus) -> Status {
        client
            .put(uri!(update_election_status(id)))
            .header(ContentType::JSON)
            .body(json!({ "status": status }).to_string())
            .dispatch()
            .await
            .status()
    }

    async fn sign_in_as(client: &Client, store: &MemoryStore, role: AdminRole) -> AdminDescription {
        store
            .insert_admin(NewAdmin::example_with_role(role))
            .await
            .unwrap();
        let response = client
            .post("/auth/admin")
            .header(ContentType::JSON)
            .body(json!(AdminCredentials::example2()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        body(response).await
    }

    #[backend_test]
    async fn admin_routes_need_admin_session(client: Client) {
        let response = client.get("/admin/elections").dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let response = client.get(uri!(alumni_stats)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(alumni)]
    async fn alumni_cannot_use_admin_routes(client: Client) {
        let response = client.get(uri!(alumni_stats)).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test]
    async fn alumni_managers_cannot_run_elections(client: Client, store: MemoryStore) {
        let admin = sign_in_as(&client, &store, AdminRole::AlumniManager).await;
        assert_eq!(admin.role, AdminRole::AlumniManager);
        assert_eq!(admin.permissions, vec![Permission::AlumniManagement]);

        let response = client.get(uri!(alumni_stats)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let response = client.get("/admin/elections").dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(ElectionSpec::current_example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test]
    async fn voting_managers_cannot_vet_alumni(client: Client, store: MemoryStore) {
        sign_in_as(&client, &store, AdminRole::VotingManager).await;
        let pending = store
            .insert_alumnus(AlumnusCore::pending_example())
            .await
            .unwrap();

        let response = client.get("/admin/elections").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let response = client.get(uri!(alumni_stats)).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client
            .post(uri!(approve_alumnus(pending.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        assert_eq!(
            store.alumnus(pending.id).await.unwrap().unwrap().status,
            ApprovalStatus::Pending
        );
    }

    #[backend_test(admin)]
    async fn election_lifecycle(client: Client) {
        let election = create(&client, &ElectionSpec::current_example()).await;
        assert_eq!(election.status, ElectionStatus::Draft);
        assert_eq!(election.total_votes, 0);
        let id = *election.id;

        let response = client
            .post(uri!(add_candidate(id)))
            .header(ContentType::JSON)
            .body(json!(CandidateSpec::example("President", "Chidi Obi")).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        let response = client
            .post(uri!(add_candidate(id)))
            .header(ContentType::JSON)
            .body(json!(CandidateSpec::example("Secretary", "Nobody")).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());

        assert_eq!(
            Status::Conflict,
            set_status(&client, id, ElectionStatus::Completed).await
        );
        assert_eq!(Status::Ok, set_status(&client, id, ElectionStatus::Active).await);
        assert_eq!(
            Status::Ok,
            set_status(&client, id, ElectionStatus::Completed).await
        );
        assert_eq!(
            Status::Conflict,
            set_status(&client, id, ElectionStatus::Active).await
        );
        assert_eq!(
            Status::NotFound,
            set_status(&client, Id::new(), ElectionStatus::Active).await
        );

        let response = client.get(uri!(results(id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let results: ElectionResults = body(response).await;
        assert_eq!(results.status, ElectionStatus::Completed);
        assert_eq!(results.positions[0].candidates.len(), 1);

        let response = client.get(uri!(audit(id))).dispatch().await;
        let audit: TallyAudit = body(response).await;
        assert!(audit.is_consistent());
    }

    #[backend_test(admin)]
    async fn invalid_election_is_bad_request(client: Client) {
        let mut spec = ElectionSpec::current_example();
        spec.positions = vec![];
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let error: serde_json::Value = body(response).await;
        assert_eq!(error["error"], "validation");
        assert!(error["request_id"].is_u64());
    }

    #[backend_test(admin)]
    async fn listing_and_updating_elections(client: Client) {
        let current = create(&client, &ElectionSpec::current_example()).await;
        let future = create(&client, &ElectionSpec::future_example()).await;
        assert_eq!(
            Status::Ok,
            set_status(&client, *current.id, ElectionStatus::Active).await
        );

        let response = client.get("/admin/elections").dispatch().await;
        let all: Vec<ElectionDescription> = body(response).await;
        let mut ids = all.iter().map(|e| e.id).collect::<Vec<ApiId>>();
        ids.sort();
        let mut expected = vec![current.id, future.id];
        expected.sort();
        assert_eq!(ids, expected);

        let response = client
            .get("/admin/elections?status=draft")
            .dispatch()
            .await;
        let drafts: Vec<ElectionDescription> = body(response).await;
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, future.id);

        let mut spec = ElectionSpec::future_example();
        spec.title = "Homecoming Committee 2026".to_string();
        let response = client
            .put(uri!(update_election(*future.id)))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let updated: ElectionDescription = body(response).await;
        assert_eq!(updated.title, "Homecoming Committee 2026");

        // Active elections are frozen.
        let response = client
            .put(uri!(update_election(*current.id)))
            .header(ContentType::JSON)
            .body(json!(ElectionSpec::current_example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());

        let response = client.get(uri!(get_election(*current.id))).dispatch().await;
        let fetched: ElectionDescription = body(response).await;
        assert_eq!(fetched.status, ElectionStatus::Active);
    }

    #[backend_test(admin)]
    async fn vetting_alumni(client: Client, store: MemoryStore, notifier: RecordingNotifier) {
        let pending = store
            .insert_alumnus(AlumnusCore::pending_example())
            .await
            .unwrap();
        let mut registration = Registration::example2();
        registration.student_id = "BU/2017/0311".to_string();
        registration.email = "ife.adeyemi@example.com".to_string();
        let other = store
            .insert_alumnus(registration.into_alumnus("BU-5R4W2P".to_string(), chrono::Utc::now()))
            .await
            .unwrap();

        let response = client.get("/admin/alumni?status=pending").dispatch().await;
        let listed: Vec<AlumnusDescription> = body(response).await;
        assert_eq!(listed.len(), 2);

        let response = client
            .post(uri!(approve_alumnus(pending.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let approved: AlumnusDescription = body(response).await;
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(notifier.sent_of(Event::RegistrationApproved).len(), 1);

        let response = client
            .post(uri!(reject_alumnus(other.id)))
            .header(ContentType::JSON)
            .body(json!({}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client
            .post(uri!(reject_alumnus(other.id)))
            .header(ContentType::JSON)
            .body(json!({"reason": "Unknown student ID"}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let response = client.get(uri!(alumni_stats)).dispatch().await;
        let stats: AlumniStats = body(response).await;
        assert_eq!(
            stats,
            AlumniStats {
                total: 2,
                pending: 0,
                approved: 1,
                rejected: 1
            }
        );

        let response = client.get(uri!(get_alumnus(Id::new()))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }
}
