//! Request workflow: per-notification chains and the run engine.

pub mod chain;
pub mod contact;
pub mod engine;
pub mod outcome;
pub mod queue;
pub mod quote;

pub use chain::{ChainReport, RequestChain, Stage};
pub use contact::{ContactSnapshot, StudentContact, contact_script, extract_contact};
pub use engine::RunEngine;
pub use outcome::{ItemOutcome, RunOutcome, RunReport, classify_url};
pub use queue::request_links_script;
pub use quote::QuoteMessage;
