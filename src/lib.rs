pub mod authentication;
pub mod configuration;
pub mod domain;
pub mod error;
pub mod queue;
pub mod repository;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod telemetry;
pub mod worker;
