use core::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a transactional email.
///
/// Quotas, statistics and log entries are all keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    Verification,
    Reset,
    Invite,
    Notification,
}

impl EmailType {
    pub const ALL: [Self; 4] = [
        Self::Verification,
        Self::Reset,
        Self::Invite,
        Self::Notification,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::Reset => "reset",
            Self::Invite => "invite",
            Self::Notification => "notification",
        }
    }
}

impl Display for EmailType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown email type: {0}")]
pub struct ParseEmailTypeError(String);

impl FromStr for EmailType {
    type Err = ParseEmailTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ParseEmailTypeError(value.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::EmailType;

    #[test]
    fn email_type() {
        assert_eq!("verification".parse(), Ok(EmailType::Verification));
        assert_eq!(" Invite ".parse(), Ok(EmailType::Invite));
        assert!("newsletter".parse::<EmailType>().is_err());

        for ty in EmailType::ALL {
            assert_eq!(ty.to_string().parse(), Ok(ty));
        }
    }
}
