pub mod sqlite;

pub use sqlite::{SqliteStorage, VectorDocument};
