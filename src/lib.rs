pub mod metrics;
pub mod sqlite_pragma;
