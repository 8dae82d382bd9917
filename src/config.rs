use std::sync::Arc;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sns::{
    config::{Credentials, Region},
    Client as SnsClient,
};
use chrono::Duration;
use log::{error, info, warn};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::directory::IdentityDirectory;
use crate::engine::VotingEngine;
use crate::model::mongodb::ensure_indexes_exist;
use crate::notify::{LogNotifier, SharedNotifier, SnsNotifier};
use crate::store::{ensure_admin_exists, MongoStore, SharedStore};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Clone, Deserialize)]
pub struct Config {
    // non-secrets
    pub(crate) hostname: String,
    pub(crate) otp_ttl: u32,
    pub(crate) auth_ttl: u32,
    // secrets
    pub(crate) jwt_secret: String,
    pub(crate) hmac_secret: String,
}

impl Config {
    /// The hostname the site is running on.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Valid lifetime of OTP in seconds.
    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl.into())
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign HMACs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Serving as {}", config.hostname());
        Ok(rocket.manage(config))
    }
}

fn default_db_name() -> String {
    "alumni_vote".to_string()
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
    default_admin_password: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places a [`SharedStore`] into managed
/// state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(&config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create indexes: {e}");
            return Err(rocket);
        }

        let store = MongoStore::new(client, &db);
        if let Err(e) = ensure_admin_exists(&store, &config.default_admin_password).await {
            error!("Failed to ensure an admin exists: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        let store: SharedStore = Arc::new(store);
        Ok(rocket.manage(store))
    }
}

/// Configuration for the AWS connection.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    notification_topic_arn: String,
    // secrets
    aws_secret_access_key: String,
}

/// A fairing that loads the AWS config and places a [`SharedNotifier`] into
/// managed state. Without AWS config, notifications are only logged.
pub struct NotifierFairing;

#[rocket::async_trait]
impl Fairing for NotifierFairing {
    fn info(&self) -> Info {
        Info {
            name: "Notifications",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<AwsConfig>() {
            Ok(config) => config,
            Err(e) => {
                warn!("No AWS config ({e}), notifications will only be logged");
                let notifier: SharedNotifier = Arc::new(LogNotifier);
                return Ok(rocket.manage(notifier));
            }
        };
        let aws_config = SdkConfig::builder()
            .region(Region::new(config.aws_region))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                config.aws_access_key_id,
                config.aws_secret_access_key,
                None,
                None,
                "rocket config",
            )))
            .behavior_version(BehaviorVersion::latest())
            .build();
        let client = SnsClient::new(&aws_config);
        info!("Loaded Amazon SNS config");

        let notifier: SharedNotifier =
            Arc::new(SnsNotifier::new(client, config.notification_topic_arn));
        Ok(rocket.manage(notifier))
    }
}

/// A fairing that wires the voting engine and identity directory from the
/// config, store and notifier already in managed state.
pub struct ServicesFairing;

#[rocket::async_trait]
impl Fairing for ServicesFairing {
    fn info(&self) -> Info {
        Info {
            name: "Services",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (config, store, notifier) = match (
            rocket.state::<Config>(),
            rocket.state::<SharedStore>(),
            rocket.state::<SharedNotifier>(),
        ) {
            (Some(config), Some(store), Some(notifier)) => {
                (config.clone(), store.clone(), notifier.clone())
            }
            _ => {
                error!("Services need config, a store and a notifier");
                return Err(rocket);
            }
        };

        let engine = VotingEngine::new(store.clone(), notifier.clone());
        let directory = IdentityDirectory::new(store, notifier, config);
        Ok(rocket.manage(engine).manage(directory))
    }
}
