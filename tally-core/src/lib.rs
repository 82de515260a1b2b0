pub mod failure;
pub mod id;

pub use failure::{assert_never_reached, Failure, Outcome};
pub use id::{AnyType, CurrencyType, Id, SettingType};
