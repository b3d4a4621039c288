pub mod cache;
pub mod communedb;
pub mod db;
pub mod listing;
pub mod photodb;
pub mod projectdb;
pub mod signalementdb;
pub mod userdb;

pub use db::DBClient;
