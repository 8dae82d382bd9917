use mongodb::bson::{to_bson, Bson};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};

/// Where an alumnus is in the vetting process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Registered, awaiting an administrator.
    Pending,
    /// Vetted; may sign in and vote.
    Approved,
    /// Turned down by an administrator.
    Rejected,
}

impl From<ApprovalStatus> for Bson {
    fn from(status: ApprovalStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
