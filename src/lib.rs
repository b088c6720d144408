//! Tutors.com autoresponder: quotes new tutoring requests announced by email.

pub mod browser;
pub mod config;
pub mod error;
pub mod intake;
pub mod mail;
pub mod notify;
pub mod scheduler;
pub mod workflow;
