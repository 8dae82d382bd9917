pub mod admin;
pub mod alumnus;
pub mod election;
pub mod eligibility;
pub mod voter;
