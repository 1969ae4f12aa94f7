pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{AccountError, Profile, ProfileEdit, Registration};
pub use repository::{AccountRepository, DynAccountRepository, SqliteAccountRepository};
pub use service::{Account, Accounts, Registered};
