pub mod cert;
pub mod cli;
pub mod db;
pub mod query;
pub mod tables;
pub mod utils;

pub use cert::{decode, Certificate, PublicKey};
pub use cli::{args, commands};
pub use db::{Database, DatabaseConfig};
pub use query::{compile, CompiledQuery, Qualifier};
pub use tables::{Table, TableRow};
pub use utils::errors;
