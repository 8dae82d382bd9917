use serde::{Deserialize, Serialize};

/// What an administrator is allowed to manage.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    /// Everything, including other admins.
    #[default]
    SuperAdmin,
    /// Vets alumni registrations.
    AlumniManager,
    /// Runs elections and candidates.
    VotingManager,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AlumniManagement,
    VotingManagement,
    UserManagement,
    SystemSettings,
}

impl AdminRole {
    /// Every permission this role carries.
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Self::SuperAdmin => &[
                AlumniManagement,
                VotingManagement,
                UserManagement,
                SystemSettings,
            ],
            Self::AlumniManager => &[AlumniManagement],
            Self::VotingManager => &[VotingManagement],
        }
    }

    pub fn permits(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}
