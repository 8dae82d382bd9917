use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::{election::ElectionStatus, eligibility::Eligibility},
    db::election::{Election, NewElection},
};

/// An election specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Distinct position names, in display order.
    pub positions: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Empty means any graduation year.
    #[serde(default)]
    pub eligible_graduation_years: Vec<i32>,
    /// Empty means any school.
    #[serde(default)]
    pub eligible_schools: Vec<String>,
}

impl ElectionSpec {
    /// Reject malformed specs.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("Election title is required".to_string()));
        }
        if self.positions.is_empty() {
            return Err(Error::Validation(
                "An election needs at least one position".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for position in &self.positions {
            if position.trim().is_empty() {
                return Err(Error::Validation("Position names cannot be blank".to_string()));
            }
            if !seen.insert(position.as_str()) {
                return Err(Error::Validation(format!(
                    "Duplicate position '{position}'"
                )));
            }
        }
        if self.start_date >= self.end_date {
            return Err(Error::Validation(
                "Election must start before it ends".to_string(),
            ));
        }
        Ok(())
    }

    pub fn eligibility(&self) -> Eligibility {
        Eligibility {
            graduation_years: self.eligible_graduation_years.clone(),
            schools: self.eligible_schools.clone(),
        }
    }

    /// Convert this spec into a fresh draft election.
    pub fn into_election(self, now: DateTime<Utc>) -> NewElection {
        let eligibility = self.eligibility();
        NewElection {
            title: self.title,
            description: self.description,
            positions: self.positions,
            start_date: self.start_date,
            end_date: self.end_date,
            status: ElectionStatus::Draft,
            eligibility,
            total_votes: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A requested lifecycle transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ElectionStatus,
}

/// An API-friendly election description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: ApiId,
    pub title: String,
    pub description: String,
    pub positions: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ElectionStatus,
    pub eligible_graduation_years: Vec<i32>,
    pub eligible_schools: Vec<String>,
    pub total_votes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        let core = election.election;
        Self {
            id: election.id.into(),
            title: core.title,
            description: core.description,
            positions: core.positions,
            start_date: core.start_date,
            end_date: core.end_date,
            status: core.status,
            eligible_graduation_years: core.eligibility.graduation_years,
            eligible_schools: core.eligibility.schools,
            total_votes: core.total_votes,
            created_at: core.created_at,
            updated_at: core.updated_at,
        }
    }
}
