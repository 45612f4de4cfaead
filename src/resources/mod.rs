//! Concrete constructs. Each one contributes cloud resources and, where it
//! has a local runtime presence, one local service.

pub mod backend;
pub mod microservice;
pub mod postgres;
pub mod queue;
pub mod storage;
pub mod trigger;
pub mod webapp;
pub mod workflow;

pub use microservice::MicroService;
pub use postgres::Postgres;
pub use queue::Queue;
pub use storage::Storage;
pub use trigger::TriggerScript;
pub use webapp::WebApp;
pub use workflow::{LambdaEmulator, StepFunctionEmulator, Workflow};
