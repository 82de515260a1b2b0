//! Applying sparse changes onto an existing record.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tally_core::{Failure, Outcome};

/// A sparse set of field changes.
///
/// Fields that are absent, or present with a `null` value, request no change.
/// There is therefore no way to reset a field to `null` through a change set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet(Map<String, Value>);

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet(Map::new())
    }

    /// Add a field change.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_owned(), value.into());
        self
    }

    /// Build a change set from a struct of optional fields. `None` fields
    /// serialize as `null` and are therefore ignored by [`update`].
    pub fn from_serialize<T: Serialize>(changes: &T) -> serde_json::Result<Self> {
        match serde_json::to_value(changes)? {
            Value::Object(fields) => Ok(ChangeSet(fields)),
            _ => Err(serde::ser::Error::custom("a change set must be an object")),
        }
    }

    /// The fields that request a change, i.e. neither absent nor `null`.
    pub fn effective(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(_, v)| !v.is_null())
    }
}

type Handler<'a, R> = Box<dyn FnMut(&mut R, Value) -> Outcome<()> + 'a>;

/// Per-field overrides for [`update`].
///
/// A handler takes full responsibility for applying its field: when one is
/// registered, the value is not assigned by default.
pub struct Handlers<'a, R> {
    handlers: BTreeMap<String, Handler<'a, R>>,
}

impl<'a, R> Handlers<'a, R> {
    pub fn new() -> Self {
        Handlers {
            handlers: BTreeMap::new(),
        }
    }

    pub fn on(
        mut self,
        field: &str,
        handler: impl FnMut(&mut R, Value) -> Outcome<()> + 'a,
    ) -> Self {
        self.handlers.insert(field.to_owned(), Box::new(handler));
        self
    }
}

impl<R> Default for Handlers<'_, R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `changes` into `record` in place.
///
/// Each effective field is passed to its handler if one is registered, and
/// assigned directly otherwise. Direct assignment goes through the record's
/// serde representation, so a value that does not fit the field's type, or a
/// field the record does not have, fails with [`Failure::InvalidValue`] and
/// leaves the record as it was before that field.
///
/// Persistence is up to the caller.
pub fn update<R>(record: &mut R, changes: &ChangeSet, handlers: &mut Handlers<'_, R>) -> Outcome<()>
where
    R: Serialize + DeserializeOwned,
{
    for (field, value) in changes.effective() {
        match handlers.handlers.get_mut(field) {
            Some(handler) => handler(&mut *record, value.clone())?,
            None => assign(&mut *record, field, value.clone())?,
        }
    }
    Ok(())
}

fn assign<R>(record: &mut R, field: &str, value: Value) -> Outcome<()>
where
    R: Serialize + DeserializeOwned,
{
    let invalid = |detail: String| Failure::InvalidValue {
        id: field.to_owned(),
        detail,
    };
    let mut fields = match serde_json::to_value(&*record) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Err(invalid("record is not a structure".to_owned())),
        Err(e) => return Err(invalid(e.to_string())),
    };
    fields.insert(field.to_owned(), value);
    *record = serde_json::from_value(Value::Object(fields)).map_err(|e| invalid(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Account {
        id: String,
        balance: i64,
        nickname: Option<String>,
    }

    fn account() -> Account {
        Account {
            id: "u1".to_owned(),
            balance: 10,
            nickname: Some("bob".to_owned()),
        }
    }

    #[test]
    fn assigns_present_fields() {
        let mut a = account();
        let changes = ChangeSet::new().with("balance", 25);
        update(&mut a, &changes, &mut Handlers::new()).unwrap();
        assert_eq!(a.balance, 25);
        assert_eq!(a.nickname.as_deref(), Some("bob"));
    }

    #[test]
    fn null_and_absent_are_ignored() {
        let mut a = account();
        let changes = ChangeSet::new().with("nickname", Value::Null);
        update(&mut a, &changes, &mut Handlers::new()).unwrap();
        assert_eq!(a, account());

        update(&mut a, &ChangeSet::new(), &mut Handlers::new()).unwrap();
        assert_eq!(a, account());
    }

    #[test]
    fn from_serialize_skips_none() {
        #[derive(Serialize)]
        struct AccountChanges {
            balance: Option<i64>,
            nickname: Option<String>,
        }
        let changes = ChangeSet::from_serialize(&AccountChanges {
            balance: None,
            nickname: Some("robert".to_owned()),
        })
        .unwrap();
        let mut a = account();
        update(&mut a, &changes, &mut Handlers::new()).unwrap();
        assert_eq!(a.balance, 10);
        assert_eq!(a.nickname.as_deref(), Some("robert"));
    }

    #[test]
    fn handler_overrides_assignment() {
        let mut calls = Vec::new();
        let mut a = account();
        {
            let mut handlers = Handlers::new().on("balance", |_record: &mut Account, v| {
                calls.push(v);
                Ok(())
            });
            let changes = ChangeSet::new().with("balance", 99);
            update(&mut a, &changes, &mut handlers).unwrap();
        }
        assert_eq!(calls, vec![json!(99)]);
        // the handler did nothing, so neither did update
        assert_eq!(a.balance, 10);
    }

    #[test]
    fn handler_can_mutate() {
        let mut a = account();
        let mut handlers = Handlers::new().on("balance", |record: &mut Account, v| {
            record.balance += v.as_i64().unwrap_or(0);
            Ok(())
        });
        let changes = ChangeSet::new().with("balance", 5).with("nickname", "b");
        update(&mut a, &changes, &mut handlers).unwrap();
        assert_eq!(a.balance, 15);
        assert_eq!(a.nickname.as_deref(), Some("b"));
    }

    #[test]
    fn handler_not_called_for_null() {
        let mut called = false;
        let mut a = account();
        let mut handlers = Handlers::new().on("nickname", |_: &mut Account, _| {
            called = true;
            Ok(())
        });
        update(&mut a, &ChangeSet::new().with("nickname", Value::Null), &mut handlers).unwrap();
        drop(handlers);
        assert!(!called);
    }

    #[test]
    fn mistyped_value_is_rejected() {
        let mut a = account();
        let r = update(
            &mut a,
            &ChangeSet::new().with("balance", "lots"),
            &mut Handlers::new(),
        );
        assert_eq!(r.unwrap_err().reason(), "invalid-value");
        assert_eq!(a, account());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut a = account();
        let r = update(
            &mut a,
            &ChangeSet::new().with("color", "red"),
            &mut Handlers::new(),
        );
        assert_eq!(r.unwrap_err().reason(), "invalid-value");
    }
}
