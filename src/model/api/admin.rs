use argon2::Config;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::admin::{AdminRole, Permission},
    db::admin::{Admin, AdminCore},
};

/// Raw admin credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<AdminCredentials> for AdminCore {
    type Error = argon2::Error;

    /// Convert [`AdminCredentials`] to a new admin by hashing the password.
    fn try_from(cred: AdminCredentials) -> Result<Self, Self::Error> {
        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(cred.password.as_bytes(), &salt, &Config::default())?;
        Ok(Self {
            name: cred.username.clone(),
            username: cred.username,
            email: String::new(),
            password_hash,
            role: AdminRole::SuperAdmin,
            last_login: None,
        })
    }
}

/// An admin as shown to other admins. Never includes the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminDescription {
    pub id: ApiId,
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: AdminRole,
    pub permissions: Vec<Permission>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<Admin> for AdminDescription {
    fn from(admin: Admin) -> Self {
        let core = admin.admin;
        Self {
            id: admin.id.into(),
            username: core.username,
            name: core.name,
            email: core.email,
            role: core.role,
            permissions: core.role.permissions().to_vec(),
            last_login: core.last_login.map(|dt| dt.to_chrono()),
        }
    }
}
