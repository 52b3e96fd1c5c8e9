//! Room addressing.
//!
//! A room isolates one page's collaboration session. Its id is the
//! colon-delimited composite `tenant:site:page`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomIdError {
    #[error("Room id must have 3 colon-separated segments, found {0}")]
    SegmentCount(usize),
    #[error("Room id segment '{0}' is empty")]
    EmptySegment(&'static str),
    #[error("Room id segment '{0}' contains ':'")]
    Delimiter(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId {
    tenant: String,
    site: String,
    page: String,
}

impl RoomId {
    pub fn new(
        tenant: impl Into<String>,
        site: impl Into<String>,
        page: impl Into<String>,
    ) -> Result<Self, RoomIdError> {
        let room = Self {
            tenant: tenant.into(),
            site: site.into(),
            page: page.into(),
        };
        for (name, value) in [("tenant", &room.tenant), ("site", &room.site), ("page", &room.page)] {
            if value.is_empty() {
                return Err(RoomIdError::EmptySegment(name));
            }
            if value.contains(':') {
                return Err(RoomIdError::Delimiter(name));
            }
        }
        Ok(room)
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn page(&self) -> &str {
        &self.page
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tenant, self.site, self.page)
    }
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [tenant, site, page] => Self::new(*tenant, *site, *page),
            _ => Err(RoomIdError::SegmentCount(parts.len())),
        }
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomId> for String {
    fn from(room: RoomId) -> Self {
        room.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let room: RoomId = "acme:marketing:home".parse().unwrap();
        assert_eq!(room.tenant(), "acme");
        assert_eq!(room.site(), "marketing");
        assert_eq!(room.page(), "home");
        assert_eq!(room.to_string(), "acme:marketing:home");
    }

    #[test]
    fn test_wrong_segment_count() {
        assert_eq!("acme:home".parse::<RoomId>(), Err(RoomIdError::SegmentCount(2)));
        assert_eq!("a:b:c:d".parse::<RoomId>(), Err(RoomIdError::SegmentCount(4)));
    }

    #[test]
    fn test_empty_segment() {
        assert_eq!("acme::home".parse::<RoomId>(), Err(RoomIdError::EmptySegment("site")));
        assert_eq!(RoomId::new("", "s", "p"), Err(RoomIdError::EmptySegment("tenant")));
    }

    #[test]
    fn test_delimiter_in_segment() {
        assert_eq!(RoomId::new("t", "s", "p:q"), Err(RoomIdError::Delimiter("page")));
    }

    #[test]
    fn test_serde_as_string() {
        let room = RoomId::new("t1", "s1", "p1").unwrap();
        let json = serde_json::to_string(&room).unwrap();
        assert_eq!(json, "\"t1:s1:p1\"");
        let back: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, room);
        assert!(serde_json::from_str::<RoomId>("\"bad\"").is_err());
    }
}
