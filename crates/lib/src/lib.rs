//! keg-lib: Core types and logic for keg
//!
//! This crate provides the formula execution engine:
//! - `Formula`: the declared contract of one installable unit
//! - `Resolver`: turns a target into an ordered `InstallPlan`
//! - `Fetcher`: retrieves and verifies source artifacts
//! - `Installer`: runs install steps in per-formula sandboxes
//! - `AcceptanceTester`: smoke-tests freshly installed formulas
//! - `Engine`: drives the whole lifecycle and reports the outcome

pub mod acceptance;
pub mod consts;
pub mod engine;
pub mod execute;
pub mod fetch;
pub mod formula;
pub mod index;
pub mod platform;
pub mod resolve;
pub mod state;
pub mod util;
