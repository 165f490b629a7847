//! # QuickAPI (items, accounts and iris inference)
//!
//! `quickapi` is a small HTTP service with three surfaces:
//!
//! - **Accounts:** registration, password login returning a signed bearer token,
//!   identity lookup and password change. Passwords are stored as Argon2id
//!   PHC strings; tokens are HS256 JWTs carrying the normalized email as subject.
//! - **Items:** public listing and lookup, bearer-gated create/update/delete.
//!   There is no per-item ownership: any authenticated user may modify any item.
//! - **Inference:** a pre-trained iris classifier loaded once per process. Each
//!   prediction is recorded against the calling user.
//!
//! ## Layering
//!
//! - [`auth`], [`items`] and [`inference`] hold the flows. They only talk to the
//!   repository traits in [`store`] and never to `sqlx` directly.
//! - [`api`] translates HTTP into flow calls and [`Error`] back into responses.
//! - [`cli`] parses configuration and starts the server.

pub mod api;
pub mod auth;
pub mod cli;
pub mod error;
pub mod inference;
pub mod items;
pub mod store;

pub use error::{Error, FieldError};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
