use rocket::Route;

mod admin;
mod alumni;
mod auth;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(alumni::routes());
    routes.extend(auth::routes());
    routes
}
