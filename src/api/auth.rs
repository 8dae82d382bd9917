use rocket::{
    http::{CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    directory::IdentityDirectory,
    error::Result,
    model::api::{
        admin::{AdminCredentials, AdminDescription},
        alumnus::AlumnusDescription,
        auth::{AuthToken, AUTH_TOKEN_COOKIE},
        otp::{OtpRequest, OtpSent, OtpVerification},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![authenticate, request_otp, verify_otp, logout]
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn authenticate(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminCredentials>,
    directory: &State<IdentityDirectory>,
    config: &State<Config>,
) -> Result<Json<AdminDescription>> {
    let admin = directory.authenticate_admin(credentials.into_inner()).await?;
    cookies.add(AuthToken::new(&admin).into_cookie(config)?);
    Ok(Json(admin.into()))
}

#[post("/auth/alumni/otp", data = "<request>", format = "json")]
pub async fn request_otp(
    request: Json<OtpRequest>,
    directory: &State<IdentityDirectory>,
) -> Result<Json<OtpSent>> {
    Ok(Json(directory.request_otp(request.into_inner()).await?))
}

#[post("/auth/alumni/verify", data = "<verification>", format = "json")]
pub async fn verify_otp(
    cookies: &CookieJar<'_>,
    verification: Json<OtpVerification>,
    directory: &State<IdentityDirectory>,
    config: &State<Config>,
) -> Result<Json<AlumnusDescription>> {
    let alumnus = directory.verify_otp(verification.into_inner()).await?;
    cookies.add(AuthToken::new(&alumnus).into_cookie(config)?);
    Ok(Json(alumnus.into()))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(AUTH_TOKEN_COOKIE);
    Status::Ok
}
