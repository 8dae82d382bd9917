use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

pub const LENGTH: usize = 6;

/// A one-time-password code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Code {
    code: [u8; LENGTH],
}

impl Code {
    /// Generate a random code.
    pub fn random() -> Self {
        let mut code = [0; LENGTH];
        let digit_dist = Uniform::from(0..=9);
        let mut rng = rand::thread_rng();
        for digit in &mut code {
            *digit = digit_dist.sample(&mut rng);
        }
        Self { code }
    }

    /// Hex-encoded HMAC-SHA256 of this code, keyed by `secret`.
    pub fn hmac(&self, secret: &[u8]) -> String {
        // HMAC accepts keys of any length.
        let mut mac = Hmac::<Sha256>::new_from_slice(secret)
            .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
        mac.update(self.to_string().as_bytes());
        HEXLOWER.encode(&mac.finalize().into_bytes())
    }
}

impl Deref for Code {
    type Target = [u8; LENGTH];

    fn deref(&self) -> &Self::Target {
        &self.code
    }
}

impl Display for Code {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for digit in self.code {
            write!(formatter, "{digit}")?;
        }
        Ok(())
    }
}

impl FromStr for Code {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let len = string.chars().count();
        if len != LENGTH {
            return Err(Self::Err::InvalidLength(len));
        }
        let mut code = [0; LENGTH];
        for (digit, c) in code.iter_mut().zip(string.chars()) {
            *digit = c
                .to_digit(10)
                .ok_or(Self::Err::InvalidChar(c))? as u8;
        }
        Ok(Self { code })
    }
}

impl TryFrom<String> for Code {
    type Error = ParseError;

    fn try_from(string: String) -> Result<Self, Self::Error> {
        string.parse()
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.to_string()
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("code must contain exactly 6 characters, found {0}")]
    InvalidLength(usize),
    #[error("code must contain only digits, found '{0}'")]
    InvalidChar(char),
}

/// An alumnus asking for a sign-in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRequest {
    pub student_id: String,
    pub verification_code: String,
}

/// An alumnus presenting the code they were sent, alongside the same
/// verification code they requested it with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpVerification {
    pub student_id: String,
    pub verification_code: String,
    pub code: Code,
}

/// Where the code was sent, with the address partially hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpSent {
    pub masked_email: String,
}
