//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared,
//! read-only resources every connection and handler needs.

use crate::config::Config;
use std::sync::Arc;
use tutor_core::{outline::CourseOutline, realtime::RealtimeTransport, steps::StepList};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The outline every new connection starts from.
    pub outline: Arc<CourseOutline>,
    /// `outline`, flattened once for the REST catalog.
    pub steps: Arc<StepList>,
    pub transport: Arc<dyn RealtimeTransport>,
    pub instructions_template: Arc<String>,
}

impl AppState {
    pub fn new(
        config: Config,
        outline: CourseOutline,
        transport: Arc<dyn RealtimeTransport>,
        instructions_template: String,
    ) -> Self {
        let steps = StepList::from_outline(&outline);
        Self {
            config: Arc::new(config),
            outline: Arc::new(outline),
            steps: Arc::new(steps),
            transport,
            instructions_template: Arc::new(instructions_template),
        }
    }
}
