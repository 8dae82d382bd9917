use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::db::{admin::Admin, alumnus::Alumnus};

/// A type of user that can hold an [`super::AuthToken`].
pub trait User {
    /// The rights every user of this type holds.
    const RIGHTS: Rights;

    /// The stable identifier carried in the token.
    fn token_id(&self) -> String;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Alumnus = 0,
    Admin = 1,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Alumnus => "alumnus",
                Self::Admin => "admin",
            }
        )
    }
}

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;

    fn token_id(&self) -> String {
        self.id.to_string()
    }
}

impl User for Alumnus {
    const RIGHTS: Rights = Rights::Alumnus;

    /// Alumni are identified by student ID, which doubles as the voter ID.
    fn token_id(&self) -> String {
        self.student_id.clone()
    }
}
