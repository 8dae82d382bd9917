use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{alumnus::ApprovalStatus, voter::Voter},
    mongodb::Id,
};

/// Core alumnus data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlumnusCore {
    /// Unique, stable identity. Doubles as the voter ID.
    pub student_id: String,
    /// Issued at registration; the second factor of OTP sign-in.
    pub verification_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub school: String,
    pub graduation_year: i32,
    pub degree: String,
    pub status: ApprovalStatus,
    /// Why the alumnus was approved or rejected.
    pub status_reason: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub registered_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl AlumnusCore {
    /// The eligibility view of this alumnus.
    pub fn voter(&self) -> Voter {
        Voter {
            voter_id: self.student_id.clone(),
            approval_status: self.status,
            school: self.school.clone(),
            graduation_year: self.graduation_year,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// An alumnus without an ID.
pub type NewAlumnus = AlumnusCore;

/// An alumnus from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alumnus {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub alumnus: AlumnusCore,
}

impl Deref for Alumnus {
    type Target = AlumnusCore;

    fn deref(&self) -> &Self::Target {
        &self.alumnus
    }
}

impl DerefMut for Alumnus {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.alumnus
    }
}


#[cfg(test)]
pub use examples::EXAMPLE_VERIFICATION_CODE;
