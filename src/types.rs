//! Shared types used across modules
//!
//! Identifier newtypes and the small enums that travel between the
//! catalog, the progress store and the access components.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a student (owned by the external account system)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub Uuid);

/// Identifier of a program a student can enroll in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub Uuid);

/// Identifier of any node in the content tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub Uuid);

macro_rules! impl_id {
    ($name:ident) => {
        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from the canonical hyphenated string form
            pub fn parse(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_id!(StudentId);
impl_id!(ProgramId);
impl_id!(UnitId);

/// Granularity of a content unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Module,
    Topic,
    Lesson,
    Resource,
    Assignment,
}

impl UnitKind {
    /// Stable string form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Module => "module",
            UnitKind::Topic => "topic",
            UnitKind::Lesson => "lesson",
            UnitKind::Resource => "resource",
            UnitKind::Assignment => "assignment",
        }
    }

    /// Parse from the database string form
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "module" => Some(UnitKind::Module),
            "topic" => Some(UnitKind::Topic),
            "lesson" => Some(UnitKind::Lesson),
            "resource" => Some(UnitKind::Resource),
            "assignment" => Some(UnitKind::Assignment),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A (kind, id) pair identifying one unit in the content tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitRef {
    pub kind: UnitKind,
    pub id: UnitId,
}

impl UnitRef {
    pub fn new(kind: UnitKind, id: UnitId) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for UnitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Gating status of a unit for one student, as shown to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Locked,
    Unlocked,
    Completed,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitStatus::Locked => write!(f, "locked"),
            UnitStatus::Unlocked => write!(f, "unlocked"),
            UnitStatus::Completed => write!(f, "completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_kind_roundtrip() {
        for kind in [
            UnitKind::Module,
            UnitKind::Topic,
            UnitKind::Lesson,
            UnitKind::Resource,
            UnitKind::Assignment,
        ] {
            assert_eq!(UnitKind::from_str_opt(kind.as_str()), Some(kind));
        }
        assert_eq!(UnitKind::from_str_opt("week"), None);
    }

    #[test]
    fn test_id_parse_roundtrip() {
        let id = UnitId::new();
        assert_eq!(UnitId::parse(&id.to_string()), Some(id));
        assert_eq!(UnitId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(UnitStatus::Locked.to_string(), "locked");
        assert_eq!(UnitStatus::Unlocked.to_string(), "unlocked");
        assert_eq!(UnitStatus::Completed.to_string(), "completed");
    }
}
