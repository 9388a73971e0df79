//! Domain layer for the appointment saga.
//!
//! This crate provides:
//! - The unit-of-work state machine and its transition table
//! - Action-label extraction over the supported event shapes

pub mod action;
pub mod error;
pub mod state;

pub use action::{
    ActionEvent, ActionExtractor, AttributeSource, DEFAULT_ACTION_ATTRIBUTE,
    DefaultActionExtractor, ElementTarget, EventTarget, extract_action, to_dataset_key,
};
pub use error::DomainError;
pub use state::{WorkState, transition};
