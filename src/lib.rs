#[macro_use]
extern crate rocket;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod store;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing, NotifierFairing, ServicesFairing};
use logging::LoggerFairing;

/// Assemble the production server: MongoDB store, SNS notifications.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(NotifierFairing)
        .attach(ServicesFairing)
        .mount("/", api::routes())
}

/// Assemble a server around the given store and notifier.
pub fn rocket_for_store_and_notifier(
    store: store::SharedStore,
    notifier: notify::SharedNotifier,
) -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .manage(store)
        .manage(notifier)
        .attach(ServicesFairing)
        .mount("/", api::routes())
}

#[cfg(test)]
#[macro_use]
extern crate backend_test;
