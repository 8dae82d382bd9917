use serde::{Deserialize, Serialize};

use super::{alumnus::ApprovalStatus, eligibility::Eligibility};

/// The eligibility-relevant view of an authenticated alumnus, as resolved by
/// the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    /// Stable voter identity: the alumnus' student ID.
    pub voter_id: String,
    pub approval_status: ApprovalStatus,
    pub school: String,
    pub graduation_year: i32,
}

impl Voter {
    /// Whether this voter passes the given gate. Unapproved voters never do.
    pub fn is_eligible(&self, eligibility: &Eligibility) -> bool {
        self.approval_status == ApprovalStatus::Approved
            && eligibility.admits(&self.school, self.graduation_year)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_voter_is_never_eligible() {
        let mut voter = Voter::example();
        voter.approval_status = ApprovalStatus::Pending;
        assert!(!voter.is_eligible(&Eligibility::unrestricted()));
        voter.approval_status = ApprovalStatus::Rejected;
        assert!(!voter.is_eligible(&Eligibility::unrestricted()));
    }
}
