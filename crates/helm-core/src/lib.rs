pub mod adapters;
pub mod boundary;
pub mod engine;
pub mod exec;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod registry;
pub mod sqlite;
pub mod task_context;
