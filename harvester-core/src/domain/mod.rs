//! Core domain types
//!
//! This module contains the structures shared by the client (which turns them
//! into wire documents) and the agent (which owns and mutates workers).

pub mod artifact;
pub mod batch;
pub mod site;
pub mod submission;
pub mod worker;
