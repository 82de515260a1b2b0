use std::{
    fmt::Display,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::failure::{Failure, Outcome};

const MAX_ID_LEN: usize = 64;

/// The identifier of a record.
///
/// The type parameter `T` ties the id to the kind of record it names; this is a
/// compile-time check only. The string itself is validated once, when the id is
/// parsed or deserialized, so every `Id` in the program is well formed.
pub struct Id<T> {
    id: String,
    // fn() -> T keeps Id Send + Sync regardless of T
    phantom: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Validate an untrusted string as an identifier.
    ///
    /// Accepted ids are non-empty, at most 64 bytes long, and consist of ASCII
    /// letters, digits, `_` and `-`.
    pub fn parse(s: &str) -> Outcome<Self> {
        let invalid = |detail: &str| Failure::InvalidId {
            id: s.to_owned(),
            detail: detail.to_owned(),
        };
        if s.is_empty() {
            return Err(invalid("identifier is empty"));
        }
        if s.len() > MAX_ID_LEN {
            return Err(invalid("identifier is longer than 64 bytes"));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(Failure::InvalidId {
                id: s.to_owned(),
                detail: format!("unexpected character {:?}", c),
            });
        }
        Ok(Id {
            id: s.to_owned(),
            phantom: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Erase the type (compile-time only)
    pub fn any(&self) -> Id<AnyType> {
        Id {
            id: self.id.clone(),
            phantom: PhantomData,
        }
    }
}

// Derived impls would require the same traits of `T`, so we implement them manually

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Id {
            id: self.id.clone(),
            phantom: PhantomData,
        }
    }
}
impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.id).finish()
    }
}
impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}
impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T> Eq for Id<T> {}
impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}
impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Id::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyType;
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingType;
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyType;
