use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::alumnus::ApprovalStatus,
    db::alumnus::{Alumnus, NewAlumnus},
};

/// Earliest graduation year accepted at registration.
pub const EARLIEST_GRADUATION_YEAR: i32 = 1950;

/// A registration request from a prospective voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub school: String,
    pub graduation_year: i32,
    #[serde(default)]
    pub degree: String,
}

impl Registration {
    /// Reject incomplete or implausible registrations.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let required = [
            ("student_id", &self.student_id),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("school", &self.school),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("Field '{field}' is required")));
            }
        }
        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => {
                return Err(Error::Validation(format!(
                    "'{}' is not a valid email address",
                    self.email
                )))
            }
        }
        if !(EARLIEST_GRADUATION_YEAR..=now.year()).contains(&self.graduation_year) {
            return Err(Error::Validation(format!(
                "Graduation year {} is out of range",
                self.graduation_year
            )));
        }
        Ok(())
    }

    /// Convert into a pending alumnus holding the given verification code.
    pub fn into_alumnus(self, verification_code: String, now: DateTime<Utc>) -> NewAlumnus {
        NewAlumnus {
            student_id: self.student_id.trim().to_string(),
            verification_code,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email.trim().to_lowercase(),
            school: self.school,
            graduation_year: self.graduation_year,
            degree: self.degree,
            status: ApprovalStatus::Pending,
            status_reason: None,
            registered_at: now,
            updated_at: now,
        }
    }
}

/// An alumnus as shown through the API. Never includes the verification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlumnusDescription {
    pub id: ApiId,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub school: String,
    pub graduation_year: i32,
    pub degree: String,
    pub status: ApprovalStatus,
    pub status_reason: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl From<Alumnus> for AlumnusDescription {
    fn from(alumnus: Alumnus) -> Self {
        let core = alumnus.alumnus;
        Self {
            id: alumnus.id.into(),
            student_id: core.student_id,
            first_name: core.first_name,
            last_name: core.last_name,
            email: core.email,
            school: core.school,
            graduation_year: core.graduation_year,
            degree: core.degree,
            status: core.status,
            status_reason: core.status_reason,
            registered_at: core.registered_at,
        }
    }
}

/// An admin's approval or rejection note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Registration counts by approval status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlumniStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl AlumniStats {
    pub fn count(&mut self, status: ApprovalStatus) {
        self.total += 1;
        match status {
            ApprovalStatus::Pending => self.pending += 1,
            ApprovalStatus::Approved => self.approved += 1,
            ApprovalStatus::Rejected => self.rejected += 1,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Registration {
        /// Registration matching [`crate::model::common::voter::Voter::example`].
        pub fn example() -> Self {
            Self {
                student_id: "BU/2015/0421".to_string(),
                first_name: "Adaeze".to_string(),
                last_name: "Okafor".to_string(),
                email: "adaeze.okafor@example.com".to_string(),
                school: "School of Science".to_string(),
                graduation_year: 2019,
                degree: "BSc Computer Science".to_string(),
            }
        }

        /// Registration matching [`crate::model::common::voter::Voter::example2`].
        pub fn example2() -> Self {
            Self {
                student_id: "BU/2016/1187".to_string(),
                first_name: "Tunde".to_string(),
                last_name: "Bakare".to_string(),
                email: "tunde.bakare@example.com".to_string(),
                school: "School of Business".to_string(),
                graduation_year: 2020,
                degree: "BSc Accounting".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_registrations_are_valid() {
        assert!(Registration::example().validate(Utc::now()).is_ok());
        assert!(Registration::example2().validate(Utc::now()).is_ok());
    }

    #[test]
    fn rejects_bad_registrations() {
        let now = Utc::now();

        let mut registration = Registration::example();
        registration.student_id = " ".to_string();
        assert!(matches!(registration.validate(now), Err(Error::Validation(_))));

        let mut registration = Registration::example();
        registration.email = "no-at-sign".to_string();
        assert!(matches!(registration.validate(now), Err(Error::Validation(_))));

        let mut registration = Registration::example();
        registration.graduation_year = now.year() + 1;
        assert!(matches!(registration.validate(now), Err(Error::Validation(_))));
    }

    #[test]
    fn stats_count_by_status() {
        let mut stats = AlumniStats::default();
        stats.count(ApprovalStatus::Pending);
        stats.count(ApprovalStatus::Approved);
        stats.count(ApprovalStatus::Approved);
        assert_eq!(
            stats,
            AlumniStats {
                total: 3,
                pending: 1,
                approved: 2,
                rejected: 0
            }
        );
    }
}
