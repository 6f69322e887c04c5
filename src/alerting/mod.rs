pub mod alerts;
pub mod engine;
