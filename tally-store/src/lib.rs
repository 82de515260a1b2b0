//! Persisted keyed stores.
//!
//! A [`store::Store`] is an in-memory mapping from identifier to record that is
//! validated from a whole JSON document when it is constructed, and written
//! back as a whole document when it is persisted. Concrete stores
//! ([`settings::SettingsStore`], [`currencies::CurrencyStore`]) compose it with
//! [`merge::update`] to apply sparse changes, and with the [`events::EventBus`]
//! to announce committed changes.

pub mod currencies;
pub mod document;
pub mod events;
pub mod merge;
pub mod settings;
pub mod store;

pub use tally_core::{Failure, Id, Outcome};
