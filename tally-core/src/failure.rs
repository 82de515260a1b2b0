//! The failure half of the result convention used by every store operation.
//!
//! Expected failures are returned as values of [`Failure`] inside an
//! [`Outcome`]. Callers match on the variant, or on [`Failure::reason`] when
//! they only need a stable discriminator (for instance to pick a user-facing
//! message). Unexpected failures travel as `anyhow::Error`; `Failure`
//! implements [`std::error::Error`] so `?` converts it at that boundary.

use std::{error::Error, fmt::Display, path::Path};

/// The outcome of a fallible store operation.
pub type Outcome<T> = Result<T, Failure>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// A raw document does not conform to the store's schema.
    Parse { location: String, detail: String },
    /// A mutation named an identifier the store does not contain.
    NotFound { store: &'static str, id: String },
    /// Reading or writing the backing location failed.
    Io { location: String, detail: String },
    /// An identifier was rejected at the boundary.
    InvalidId { id: String, detail: String },
    /// A new value does not fit the record it is merged into.
    InvalidValue { id: String, detail: String },
    /// A creation named an identifier the store already contains.
    AlreadyExists { store: &'static str, id: String },
    /// A post-update side effect failed. The mutation itself was persisted.
    SideEffect { id: String, detail: String },
}

impl Failure {
    /// Stable discriminator for this failure.
    pub fn reason(&self) -> &'static str {
        match self {
            Failure::Parse { .. } => "invalid-schema",
            Failure::NotFound { .. } => "not-found",
            Failure::Io { .. } => "io",
            Failure::InvalidId { .. } => "invalid-id",
            Failure::InvalidValue { .. } => "invalid-value",
            Failure::AlreadyExists { .. } => "already-exists",
            Failure::SideEffect { .. } => "side-effect",
        }
    }

    /// Free-form description, without the reason prefix.
    pub fn detail(&self) -> String {
        match self {
            Failure::Parse { location, detail } => format!("{}: {}", location, detail),
            Failure::NotFound { store, id } => format!("no {} with id '{}'", store, id),
            Failure::Io { location, detail } => format!("{}: {}", location, detail),
            Failure::InvalidId { id, detail } => format!("'{}': {}", id, detail),
            Failure::InvalidValue { id, detail } => format!("'{}': {}", id, detail),
            Failure::AlreadyExists { store, id } => {
                format!("{} with id '{}' already exists", store, id)
            }
            Failure::SideEffect { id, detail } => {
                format!("side effect of '{}' failed: {}", id, detail)
            }
        }
    }

    pub fn parse(location: &Path, detail: impl Display) -> Self {
        Failure::Parse {
            location: location.display().to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn io(location: &Path, detail: impl Display) -> Self {
        Failure::Io {
            location: location.display().to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn side_effect(id: &str, error: &anyhow::Error) -> Self {
        Failure::SideEffect {
            id: id.to_owned(),
            // alternate formatting keeps the context chain
            detail: format!("{:#}", error),
        }
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason(), self.detail())
    }
}
impl Error for Failure {}

/// Marks a branch that an exhaustive case analysis should never reach.
///
/// Panics with the unexpected value, so that a missed variant fails loudly
/// instead of being silently ignored.
#[track_caller]
pub fn assert_never_reached<T: std::fmt::Debug>(value: T) -> ! {
    panic!(
        "case analysis is not exhaustive: unexpected value {:?}",
        value
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn reasons_are_distinct() {
        let path = PathBuf::from("data/settings.json");
        let failures = vec![
            Failure::parse(&path, "expected an object"),
            Failure::NotFound {
                store: "setting",
                id: "missing".to_owned(),
            },
            Failure::io(&path, "permission denied"),
            Failure::InvalidId {
                id: "".to_owned(),
                detail: "empty".to_owned(),
            },
            Failure::InvalidValue {
                id: "language".to_owned(),
                detail: "expected a string".to_owned(),
            },
            Failure::AlreadyExists {
                store: "currency",
                id: "gold".to_owned(),
            },
            Failure::side_effect("language", &anyhow::anyhow!("locale missing")),
        ];
        let mut reasons: Vec<&str> = failures.iter().map(|f| f.reason()).collect();
        reasons.sort();
        reasons.dedup();
        assert_eq!(reasons.len(), failures.len());
    }

    #[test]
    fn display_starts_with_reason() {
        let f = Failure::NotFound {
            store: "setting",
            id: "missing".to_owned(),
        };
        assert_eq!(f.to_string(), "not-found: no setting with id 'missing'");
    }

    #[test]
    fn side_effect_keeps_context_chain() {
        let e = anyhow::anyhow!("file not found").context("loading locale fr");
        let f = Failure::side_effect("language", &e);
        assert_eq!(
            f.detail(),
            "side effect of 'language' failed: loading locale fr: file not found"
        );
    }

    #[test]
    fn converts_into_anyhow() {
        fn fails() -> anyhow::Result<()> {
            Err(Failure::io(Path::new("/nonexistent"), "no such directory"))?;
            Ok(())
        }
        let e = fails().unwrap_err();
        let f = e.downcast_ref::<Failure>().unwrap();
        assert_eq!(f.reason(), "io");
    }

    #[test]
    #[should_panic(expected = "case analysis is not exhaustive")]
    fn never_reached_panics() {
        assert_never_reached("surprise");
    }
}
