use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    db::candidate::{Candidate, NewCandidate},
    mongodb::Id,
};

/// A candidate specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub position: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub qualifications: Vec<String>,
    #[serde(default)]
    pub manifesto: String,
    #[serde(default)]
    pub photo: Option<String>,
}

impl CandidateSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Candidate name is required".to_string()));
        }
        Ok(())
    }

    /// Convert into a candidate for the given election, with no votes.
    pub fn into_candidate(self, election_id: Id, now: DateTime<Utc>) -> NewCandidate {
        NewCandidate {
            election_id,
            position: self.position,
            name: self.name,
            bio: self.bio,
            qualifications: self.qualifications,
            manifesto: self.manifesto,
            photo: self.photo,
            votes: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An API-friendly candidate description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub election_id: ApiId,
    pub position: String,
    pub name: String,
    pub bio: String,
    pub qualifications: Vec<String>,
    pub manifesto: String,
    pub photo: Option<String>,
    /// Only revealed to admins, or once the election has completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<u64>,
}

impl CandidateDescription {
    /// Describe the candidate without revealing their tally.
    pub fn without_tally(candidate: Candidate) -> Self {
        Self {
            votes: None,
            ..candidate.into()
        }
    }
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        let core = candidate.candidate;
        Self {
            id: candidate.id.into(),
            election_id: core.election_id.into(),
            position: core.position,
            name: core.name,
            bio: core.bio,
            qualifications: core.qualifications,
            manifesto: core.manifesto,
            photo: core.photo,
            votes: Some(core.votes),
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl CandidateSpec {
        pub fn example(position: &str, name: &str) -> Self {
            Self {
                position: position.to_string(),
                name: name.to_string(),
                bio: format!("{name} graduated with honours and has served the association since."),
                qualifications: vec!["BSc".to_string()],
                manifesto: "Transparency and engagement.".to_string(),
                photo: None,
            }
        }
    }
}
