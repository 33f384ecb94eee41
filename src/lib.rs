// DOTS signal-channel server core: request dispatch, mitigation lifecycle,
// blocker selection. The CoAP/DTLS transport, driver plugins and process
// boot live outside this crate.

pub mod config;
pub mod errors;

// Wire protocol
pub mod codec;
pub mod messages;

// Data model
pub mod customer;
pub mod mitigation_scope;
pub mod protection;
pub mod session_config;
pub mod validators;

// Storage
pub mod repository;

// Enforcement
pub mod blocker;
pub mod blocker_selection;
pub mod orchestrator;

// Request handling
pub mod controllers;
pub mod dispatcher;
