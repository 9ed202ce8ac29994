// Read-only graph queries

pub mod engine;

pub use engine::{QueryEngine, QueryKind, QueryResult};
