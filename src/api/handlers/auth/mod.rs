//! Account endpoints under `/auth`.

pub mod login;
pub mod me;
pub mod password;
pub mod principal;
pub mod register;
pub mod types;

pub use principal::require_user;
