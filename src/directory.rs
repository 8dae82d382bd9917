//! The identity directory: who alumni are, whether they are approved, and
//! how they and administrators sign in.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use mongodb::bson::DateTime as BsonDateTime;
use rand::{distributions::Alphanumeric, Rng};
use rocket::{
    http::Status,
    request::{self, FromRequest},
    Request, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        admin::AdminCredentials,
        alumnus::{AlumniStats, Registration},
        auth::{AuthToken, Rights, AUTH_TOKEN_COOKIE},
        otp::{Code, OtpRequest, OtpSent, OtpVerification},
    },
    common::{admin::Permission, alumnus::ApprovalStatus, voter::Voter},
    db::{admin::Admin, alumnus::Alumnus, otp::OtpSession},
    mongodb::Id,
};
use crate::notify::{notify, Event, Notification, SharedNotifier};
use crate::store::SharedStore;

const VERIFICATION_CODE_PREFIX: &str = "BU-";
const VERIFICATION_CODE_LENGTH: usize = 6;

#[derive(Clone)]
pub struct IdentityDirectory {
    store: SharedStore,
    notifier: SharedNotifier,
    config: Config,
}

impl IdentityDirectory {
    pub fn new(store: SharedStore, notifier: SharedNotifier, config: Config) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Resolve a session token to the voter it belongs to.
    ///
    /// The token's signature and expiry are checked, then the alumnus is
    /// re-read so approval changes take effect immediately.
    pub async fn resolve_voter(&self, session_token: &str) -> Result<Voter> {
        Ok(self.resolve_alumnus(session_token).await?.voter())
    }

    pub async fn resolve_alumnus(&self, session_token: &str) -> Result<Alumnus> {
        let token = AuthToken::<Alumnus>::decode(session_token, &self.config)
            .map_err(|_| Error::Unauthorized("Invalid or expired session".to_string()))?;
        if !token.permits(Rights::Alumnus) {
            return Err(Error::Unauthorized("Not an alumnus session".to_string()));
        }
        self.store
            .alumnus_by_student_id(token.id())
            .await?
            .ok_or_else(|| Error::Unauthorized("Unknown alumnus".to_string()))
    }

    /// Register a new alumnus, pending approval.
    pub async fn register(&self, registration: Registration) -> Result<Alumnus> {
        let now = Utc::now();
        registration.validate(now)?;
        let alumnus = self
            .store
            .insert_alumnus(registration.into_alumnus(verification_code(), now))
            .await?;
        info!("Registered alumnus {} ({})", alumnus.id, alumnus.student_id);

        let notification = Notification::new(Event::RegistrationReceived, alumnus.email.clone())
            .with("name", alumnus.full_name())
            .with("student_id", alumnus.student_id.clone());
        notify(self.notifier.as_ref(), notification).await;
        Ok(alumnus)
    }

    pub async fn alumnus(&self, id: Id) -> Result<Alumnus> {
        self.store
            .alumnus(id)
            .await?
            .ok_or_else(|| Error::not_found("Alumnus", id))
    }

    pub async fn list_alumni(&self, status: Option<ApprovalStatus>) -> Result<Vec<Alumnus>> {
        self.store.alumni(status).await
    }

    pub async fn stats(&self) -> Result<AlumniStats> {
        let mut stats = AlumniStats::default();
        for alumnus in self.store.alumni(None).await? {
            stats.count(alumnus.status);
        }
        Ok(stats)
    }

    /// Approve an alumnus and send them their verification code.
    pub async fn approve(&self, id: Id, reason: Option<String>) -> Result<Alumnus> {
        let alumnus = self
            .set_status(id, ApprovalStatus::Approved, reason)
            .await?;
        let notification = Notification::new(Event::RegistrationApproved, alumnus.email.clone())
            .with("name", alumnus.full_name())
            .with("verification_code", alumnus.verification_code.clone())
            .with(
                "dashboard_url",
                format!("https://{}/alumni/dashboard", self.config.hostname()),
            );
        notify(self.notifier.as_ref(), notification).await;
        Ok(alumnus)
    }

    /// Reject an alumnus. A reason is required.
    pub async fn reject(&self, id: Id, reason: Option<String>) -> Result<Alumnus> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::Validation("A rejection reason is required".to_string()))?;
        let alumnus = self
            .set_status(id, ApprovalStatus::Rejected, Some(reason.clone()))
            .await?;
        let notification = Notification::new(Event::RegistrationRejected, alumnus.email.clone())
            .with("name", alumnus.full_name())
            .with("reason", reason);
        notify(self.notifier.as_ref(), notification).await;
        Ok(alumnus)
    }

    async fn set_status(
        &self,
        id: Id,
        status: ApprovalStatus,
        reason: Option<String>,
    ) -> Result<Alumnus> {
        let alumnus = self
            .store
            .set_alumnus_status(id, status, reason, Utc::now())
            .await?
            .ok_or_else(|| Error::not_found("Alumnus", id))?;
        info!("Alumnus {id} is now {status:?}");
        Ok(alumnus)
    }

    /// Send a sign-in code to an approved alumnus.
    pub async fn request_otp(&self, request: OtpRequest) -> Result<OtpSent> {
        self.request_otp_at(request, Utc::now()).await
    }

    pub async fn request_otp_at(&self, request: OtpRequest, now: DateTime<Utc>) -> Result<OtpSent> {
        let alumnus = self
            .store
            .alumnus_by_student_id(request.student_id.trim())
            .await?
            .filter(|alumnus| alumnus.verification_code == request.verification_code.trim())
            .ok_or_else(|| {
                Error::Unauthorized("Invalid student ID or verification code".to_string())
            })?;
        if alumnus.status != ApprovalStatus::Approved {
            return Err(Error::NotEligible(format!(
                "Registration is {:?}, not approved",
                alumnus.status
            )));
        }

        let code = Code::random();
        self.store
            .insert_otp(OtpSession::new(
                alumnus.student_id.clone(),
                code.hmac(self.config.hmac_secret()),
                now + self.config.otp_ttl(),
            ))
            .await?;

        let notification = Notification::new(Event::OtpIssued, alumnus.email.clone())
            .with("code", code.to_string())
            .with(
                "expires_in_minutes",
                self.config.otp_ttl().num_minutes().to_string(),
            );
        notify(self.notifier.as_ref(), notification).await;

        Ok(OtpSent {
            masked_email: mask_email(&alumnus.email),
        })
    }

    /// Redeem a sign-in code. Each code works once, before it expires.
    pub async fn verify_otp(&self, verification: OtpVerification) -> Result<Alumnus> {
        self.verify_otp_at(verification, Utc::now()).await
    }

    pub async fn verify_otp_at(
        &self,
        verification: OtpVerification,
        now: DateTime<Utc>,
    ) -> Result<Alumnus> {
        let student_id = verification.student_id.trim();
        let alumnus = self
            .store
            .alumnus_by_student_id(student_id)
            .await?
            .filter(|alumnus| alumnus.verification_code == verification.verification_code.trim())
            .ok_or_else(|| {
                Error::Unauthorized("Invalid student ID or verification code".to_string())
            })?;
        let code_hmac = verification.code.hmac(self.config.hmac_secret());
        if !self.store.redeem_otp(student_id, &code_hmac, now).await? {
            warn!("Failed sign-in attempt for {student_id}");
            return Err(Error::Unauthorized("Invalid or expired OTP".to_string()));
        }
        if alumnus.status != ApprovalStatus::Approved {
            return Err(Error::NotEligible(format!(
                "Registration is {:?}, not approved",
                alumnus.status
            )));
        }
        info!("Alumnus {} signed in", alumnus.student_id);
        Ok(alumnus)
    }

    /// Check an admin's username and password.
    pub async fn authenticate_admin(&self, credentials: AdminCredentials) -> Result<Admin> {
        let mut admin = self
            .store
            .admin_by_username(&credentials.username)
            .await?
            .filter(|admin| admin.verify_password(&credentials.password))
            .ok_or_else(|| Error::Unauthorized("Invalid username or password".to_string()))?;
        let now = Utc::now();
        self.store.record_admin_login(admin.id, now).await?;
        admin.last_login = Some(BsonDateTime::from_chrono(now));
        info!("Admin {} signed in", admin.username);
        Ok(admin)
    }

    pub async fn admin(&self, id: Id) -> Result<Admin> {
        self.store
            .admin(id)
            .await?
            .ok_or_else(|| Error::not_found("Admin", id))
    }

    /// Resolve an admin session to an admin holding `permission`.
    ///
    /// The admin is re-read so role changes and removals take effect
    /// immediately.
    pub async fn resolve_admin(
        &self,
        token: &AuthToken<Admin>,
        permission: Permission,
    ) -> Result<Admin> {
        let id = token
            .id()
            .parse::<Id>()
            .map_err(|_| Error::Unauthorized("Malformed admin session".to_string()))?;
        let admin = match self.admin(id).await {
            Ok(admin) => admin,
            Err(Error::NotFound(_)) => {
                return Err(Error::Unauthorized("Unknown admin".to_string()))
            }
            Err(err) => return Err(err),
        };
        if !admin.role.permits(permission) {
            return Err(Error::NotEligible(format!(
                "Admin {} lacks {permission:?}",
                admin.username
            )));
        }
        Ok(admin)
    }
}

/// A fresh verification code, e.g. `BU-7Q2K9X`.
fn verification_code() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFICATION_CODE_LENGTH)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("{VERIFICATION_CODE_PREFIX}{suffix}")
}

/// Hide most of the local part of an email address: `ad***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{visible}***@{domain}")
        }
        None => "***".to_string(),
    }
}

/// A signed-in alumnus, resolved through the directory on every request.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for Alumnus {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let directory = match req.guard::<&State<IdentityDirectory>>().await {
            request::Outcome::Success(directory) => directory,
            _ => {
                return request::Outcome::Error((
                    Status::InternalServerError,
                    Error::Internal("Identity directory is not managed".to_string()),
                ))
            }
        };
        let token = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie.value().to_string(),
            None => return request::Outcome::Forward(Status::Unauthorized),
        };
        match directory.resolve_alumnus(&token).await {
            Ok(alumnus) => request::Outcome::Success(alumnus),
            Err(Error::Unauthorized(reason)) => {
                debug!("Rejected alumnus session: {reason}");
                request::Outcome::Forward(Status::Unauthorized)
            }
            Err(err) => request::Outcome::Error((err.status(), err)),
        }
    }
}

/// An admin allowed to vet alumni registrations.
pub struct AlumniManager(pub Admin);

/// An admin allowed to run elections.
pub struct VotingManager(pub Admin);

async fn admin_with<'r>(
    req: &'r Request<'_>,
    permission: Permission,
) -> request::Outcome<Admin, Error> {
    let token = match req.guard::<AuthToken<Admin>>().await {
        request::Outcome::Success(token) => token,
        request::Outcome::Forward(status) => return request::Outcome::Forward(status),
        request::Outcome::Error(failure) => return request::Outcome::Error(failure),
    };
    let directory = match req.guard::<&State<IdentityDirectory>>().await {
        request::Outcome::Success(directory) => directory,
        _ => {
            return request::Outcome::Error((
                Status::InternalServerError,
                Error::Internal("Identity directory is not managed".to_string()),
            ))
        }
    };
    match directory.resolve_admin(&token, permission).await {
        Ok(admin) => request::Outcome::Success(admin),
        Err(Error::Unauthorized(reason)) => {
            debug!("Rejected admin session: {reason}");
            request::Outcome::Forward(Status::Unauthorized)
        }
        Err(Error::NotEligible(reason)) => {
            debug!("{reason}");
            request::Outcome::Forward(Status::Forbidden)
        }
        Err(err) => request::Outcome::Error((err.status(), err)),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AlumniManager {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        admin_with(req, Permission::AlumniManagement)
            .await
            .map(AlumniManager)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VotingManager {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        admin_with(req, Permission::VotingManagement)
            .await
            .map(VotingManager)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::model::common::admin::AdminRole;
    use crate::model::db::{
        admin::NewAdmin,
        alumnus::{AlumnusCore, EXAMPLE_VERIFICATION_CODE},
    };
    use crate::notify::RecordingNotifier;
    use crate::store::{DirectoryStore, MemoryStore};

    fn directory() -> (IdentityDirectory, MemoryStore, Arc<RecordingNotifier>) {
        let store = MemoryStore::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let directory = IdentityDirectory::new(
            Arc::new(store.clone()),
            notifier.clone(),
            Config::example(),
        );
        (directory, store, notifier)
    }

    async fn approved(store: &MemoryStore) -> Alumnus {
        store
            .insert_alumnus(AlumnusCore::approved_example())
            .await
            .unwrap()
    }


    #[test]
    fn masks_emails() {
        assert_eq!(mask_email("adaeze.okafor@example.com"), "ad***@example.com");
        assert_eq!(mask_email("a@example.com"), "a***@example.com");
        assert_eq!(mask_email("nonsense"), "***");
    }

    #[test]
    fn verification_codes_have_the_expected_shape() {
        let code = verification_code();
        assert_eq!(code.len(), 9);
        assert!(code.starts_with("BU-"));
        assert!(code[3..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[rocket::async_test]
    async fn registration_is_pending_and_unique() {
        let (directory, _, notifier) = directory();
        let alumnus = directory.register(Registration::example()).await.unwrap();
        assert_eq!(alumnus.status, ApprovalStatus::Pending);
        assert!(alumnus.verification_code.starts_with("BU-"));
        assert_eq!(notifier.sent_of(Event::RegistrationReceived).len(), 1);

        assert!(matches!(
            directory.register(Registration::example()).await,
            Err(Error::Conflict(_))
        ));
    }

    #[rocket::async_test]
    async fn approval_sends_the_verification_code() {
        let (directory, _, notifier) = directory();
        let alumnus = directory.register(Registration::example()).await.unwrap();
        let approved = directory.approve(alumnus.id, None).await.unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);

        let sent = notifier.sent_of(Event::RegistrationApproved);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].payload.get("verification_code"),
            Some(&alumnus.verification_code)
        );
        assert_eq!(
            sent[0].payload.get("dashboard_url").map(String::as_str),
            Some("https://localhost/alumni/dashboard")
        );

        assert!(matches!(
            directory.approve(Id::new(), None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn rejection_needs_a_reason() {
        let (directory, _, _) = directory();
        let alumnus = directory.register(Registration::example2()).await.unwrap();
        assert!(matches!(
            directory.reject(alumnus.id, Some("  ".to_string())).await,
            Err(Error::Validation(_))
        ));
        let rejected = directory
            .reject(alumnus.id, Some("Not a graduate".to_string()))
            .await
            .unwrap();
        assert_eq!(rejected.status, ApprovalStatus::Rejected);
        assert_eq!(rejected.status_reason.as_deref(), Some("Not a graduate"));

        let stats = directory.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[rocket::async_test]
    async fn otp_sign_in_happy_path() {
        let (directory, store, notifier) = directory();
        let alumnus = approved(&store).await;

        let sent = directory.request_otp(OtpRequest::example()).await.unwrap();
        assert_eq!(sent.masked_email, "ad***@example.com");
        let code = notifier.last_code_for(&alumnus.email).unwrap();

        let signed_in = directory
            .verify_otp(OtpVerification::example(&code))
            .await
            .unwrap();
        assert_eq!(signed_in.id, alumnus.id);

        // Single use.
        assert!(matches!(
            directory.verify_otp(OtpVerification::example(&code)).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[rocket::async_test]
    async fn otp_expires() {
        let (directory, store, notifier) = directory();
        let alumnus = approved(&store).await;
        let now = Utc::now();
        directory
            .request_otp_at(OtpRequest::example(), now)
            .await
            .unwrap();
        let code = notifier.last_code_for(&alumnus.email).unwrap();

        let too_late = now + Config::example().otp_ttl() + Duration::seconds(1);
        assert!(matches!(
            directory
                .verify_otp_at(OtpVerification::example(&code), too_late)
                .await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[rocket::async_test]
    async fn otp_requires_matching_code_and_approval() {
        let (directory, store, notifier) = directory();

        let mut wrong = OtpRequest::example();
        wrong.verification_code = "BU-WRONG1".to_string();
        assert!(matches!(
            directory.request_otp(wrong).await,
            Err(Error::Unauthorized(_))
        ));

        let mut pending = AlumnusCore::approved_example();
        pending.status = ApprovalStatus::Pending;
        store.insert_alumnus(pending).await.unwrap();
        assert!(matches!(
            directory.request_otp(OtpRequest::example()).await,
            Err(Error::NotEligible(_))
        ));
        assert!(notifier.sent_of(Event::OtpIssued).is_empty());
        assert_eq!(OtpRequest::example().verification_code, EXAMPLE_VERIFICATION_CODE);
    }

    #[rocket::async_test]
    async fn otp_verify_needs_the_verification_code() {
        let (directory, store, notifier) = directory();
        let alumnus = approved(&store).await;
        directory.request_otp(OtpRequest::example()).await.unwrap();
        let code = notifier.last_code_for(&alumnus.email).unwrap();

        let mut wrong = OtpVerification::example(&code);
        wrong.verification_code = "BU-WRONG1".to_string();
        assert!(matches!(
            directory.verify_otp(wrong).await,
            Err(Error::Unauthorized(_))
        ));

        // The code was not spent by the rejected attempt.
        directory
            .verify_otp(OtpVerification::example(&code))
            .await
            .unwrap();
    }

    #[rocket::async_test]
    async fn a_new_otp_replaces_the_old_one() {
        let (directory, store, notifier) = directory();
        let alumnus = approved(&store).await;
        directory.request_otp(OtpRequest::example()).await.unwrap();
        let first = notifier.last_code_for(&alumnus.email).unwrap();
        directory.request_otp(OtpRequest::example()).await.unwrap();
        let second = notifier.last_code_for(&alumnus.email).unwrap();

        if first != second {
            assert!(matches!(
                directory.verify_otp(OtpVerification::example(&first)).await,
                Err(Error::Unauthorized(_))
            ));
        }
        directory
            .verify_otp(OtpVerification::example(&second))
            .await
            .unwrap();
    }

    #[rocket::async_test]
    async fn repeated_wrong_otps_burn_the_session() {
        let (directory, store, notifier) = directory();
        let alumnus = approved(&store).await;
        directory.request_otp(OtpRequest::example()).await.unwrap();
        let code = notifier.last_code_for(&alumnus.email).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..OtpSession::MAX_ATTEMPTS {
            assert!(matches!(
                directory.verify_otp(OtpVerification::example(wrong)).await,
                Err(Error::Unauthorized(_))
            ));
        }
        assert!(matches!(
            directory.verify_otp(OtpVerification::example(&code)).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[rocket::async_test]
    async fn admin_sessions_are_not_alumnus_sessions() {
        let (directory, store, _) = directory();
        let admin = store.insert_admin(NewAdmin::example()).await.unwrap();
        let mut alumnus = AlumnusCore::approved_example();
        alumnus.student_id = admin.id.to_string();
        store.insert_alumnus(alumnus).await.unwrap();

        let jwt = AuthToken::new(&admin)
            .encode(&Config::example(), Utc::now())
            .unwrap();
        assert!(matches!(
            directory.resolve_alumnus(&jwt).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[rocket::async_test]
    async fn admin_permissions_follow_the_role() {
        let (directory, store, _) = directory();
        let manager = store
            .insert_admin(NewAdmin::example_with_role(AdminRole::AlumniManager))
            .await
            .unwrap();
        let token = AuthToken::new(&manager);

        let resolved = directory
            .resolve_admin(&token, Permission::AlumniManagement)
            .await
            .unwrap();
        assert_eq!(resolved.id, manager.id);
        assert!(matches!(
            directory
                .resolve_admin(&token, Permission::VotingManagement)
                .await,
            Err(Error::NotEligible(_))
        ));

        let gone = Admin {
            id: Id::new(),
            admin: NewAdmin::example(),
        };
        assert!(matches!(
            directory
                .resolve_admin(&AuthToken::new(&gone), Permission::AlumniManagement)
                .await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[rocket::async_test]
    async fn sessions_resolve_to_voters() {
        let (directory, store, _) = directory();
        let alumnus = approved(&store).await;
        let jwt = AuthToken::new(&alumnus)
            .encode(&Config::example(), Utc::now())
            .unwrap();

        let voter = directory.resolve_voter(&jwt).await.unwrap();
        assert_eq!(voter, alumnus.voter());

        assert!(matches!(
            directory.resolve_voter("not a token").await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[rocket::async_test]
    async fn admin_sign_in() {
        let (directory, store, _) = directory();
        let admin = store.insert_admin(NewAdmin::example()).await.unwrap();
        assert!(admin.last_login.is_none());

        let signed_in = directory
            .authenticate_admin(AdminCredentials::example1())
            .await
            .unwrap();
        assert_eq!(signed_in.id, admin.id);
        assert!(signed_in.last_login.is_some());
        assert_eq!(
            directory.admin(admin.id).await.unwrap().last_login,
            signed_in.last_login
        );

        let mut wrong = AdminCredentials::example1();
        wrong.password = "guess".to_string();
        assert!(matches!(
            directory.authenticate_admin(wrong).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            directory
                .authenticate_admin(AdminCredentials::empty())
                .await,
            Err(Error::Unauthorized(_))
        ));
    }
}
