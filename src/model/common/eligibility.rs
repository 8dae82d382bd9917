use serde::{Deserialize, Serialize};

/// Which alumni may take part in an election.
///
/// An empty list on either axis places no restriction on that axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    #[serde(default)]
    pub graduation_years: Vec<i32>,
    #[serde(default)]
    pub schools: Vec<String>,
}

impl Eligibility {
    /// Admit everybody.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Does this gate admit someone from `school` who graduated in `graduation_year`?
    pub fn admits(&self, school: &str, graduation_year: i32) -> bool {
        let year_ok =
            self.graduation_years.is_empty() || self.graduation_years.contains(&graduation_year);
        let school_ok = self.schools.is_empty() || self.schools.iter().any(|s| s == school);
        year_ok && school_ok
    }
}
