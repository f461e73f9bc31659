use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Textual principal ids: lowercase base32 groups of at most five characters
// separated by '-'. The anonymous principal is the fixed id below.

pub const ANONYMOUS_PRINCIPAL: &str = "2vxsx-fae";

const MAX_TEXT_LEN: usize = 63;
const GROUP_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrincipalError {
    #[error("principal text is empty")]
    Empty,
    #[error("principal text too long ({0} chars)")]
    TooLong(usize),
    #[error("principal group {index} is malformed: {group:?}")]
    MalformedGroup { index: usize, group: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_PRINCIPAL.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_PRINCIPAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Principal {
    type Err = PrincipalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(PrincipalError::Empty);
        }
        if text.len() > MAX_TEXT_LEN {
            return Err(PrincipalError::TooLong(text.len()));
        }
        let groups: Vec<&str> = text.split('-').collect();
        let last = groups.len() - 1;
        for (index, group) in groups.iter().enumerate() {
            let well_formed = !group.is_empty()
                && group.len() <= GROUP_LEN
                // only the trailing group may be short
                && (index == last || group.len() == GROUP_LEN)
                && group
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b));
            if !well_formed {
                return Err(PrincipalError::MalformedGroup {
                    index,
                    group: (*group).to_string(),
                });
            }
        }
        Ok(Self(text.to_string()))
    }
}

impl TryFrom<String> for Principal {
    type Error = PrincipalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_roundtrips_through_text() {
        let p: Principal = ANONYMOUS_PRINCIPAL.parse().unwrap();
        assert!(p.is_anonymous());
        assert_eq!(p, Principal::anonymous());
    }

    #[test]
    fn accepts_canister_style_ids() {
        let p: Principal = "rrkah-fqaaa-aaaaa-aaaaq-cai".parse().unwrap();
        assert!(!p.is_anonymous());
        assert_eq!(p.to_string(), "rrkah-fqaaa-aaaaa-aaaaq-cai");
    }

    #[test]
    fn rejects_bad_alphabet_and_group_shape() {
        assert!(matches!(
            "rrkah-fqa1a-cai".parse::<Principal>(),
            Err(PrincipalError::MalformedGroup { index: 1, .. })
        ));
        assert!(matches!(
            "rrk-fqaaa".parse::<Principal>(),
            Err(PrincipalError::MalformedGroup { index: 0, .. })
        ));
        assert_eq!("".parse::<Principal>(), Err(PrincipalError::Empty));
    }

    #[test]
    fn deserializes_from_json_string() {
        let p: Principal = serde_json::from_str("\"2vxsx-fae\"").unwrap();
        assert!(p.is_anonymous());
        assert!(serde_json::from_str::<Principal>("\"NOT-valid\"").is_err());
    }
}
