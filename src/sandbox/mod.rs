//! Sandbox module containing the checker, the runtime gates and the
//! orchestrator that ties them to the runtime.

pub mod checker;
pub mod config;
pub mod executor;
pub mod gates;
pub mod limits;
pub mod policy;
pub mod wrapper;
