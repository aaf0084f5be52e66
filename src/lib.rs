pub mod city;
pub mod collaborator;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod model;
pub mod observability;
pub mod params;
pub mod planner;
pub mod sql;
pub mod wal;
pub mod wire;
