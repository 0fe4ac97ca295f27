use std::fmt;

use crate::geometry::GeometryId;
use crate::modes::Mode;

/// Notifications emitted by the scene core for the surrounding UI.
///
/// The core never talks to a toolkit signal type directly; the shell
/// drains this bus once per input event and refreshes lists, legends and
/// the status bar from what it finds.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// Scene contents changed (entities added, removed or reshaped).
    DataChanged,
    /// The selected-id set changed.
    SelectionChanged { selected: Vec<GeometryId> },
    /// The interaction mode changed.
    ModeChanged { mode: Mode },
    /// Histogram cutoff widget moved; informational only.
    CutoffChanged { value: f32 },
    /// Free-form text for the status bar.
    Status { message: String },
    /// The renderer should redraw.
    RedrawRequested,
}

impl SceneEvent {
    pub fn status(message: impl Into<String>) -> Self {
        SceneEvent::Status { message: message.into() }
    }
}

impl fmt::Display for SceneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneEvent::DataChanged => write!(f, "DataChanged"),
            SceneEvent::SelectionChanged { selected } => {
                write!(f, "SelectionChanged count={}", selected.len())
            }
            SceneEvent::ModeChanged { mode } => write!(f, "ModeChanged mode={}", mode.label()),
            SceneEvent::CutoffChanged { value } => write!(f, "CutoffChanged value={value:.3}"),
            SceneEvent::Status { message } => write!(f, "Status {message}"),
            SceneEvent::RedrawRequested => write!(f, "RedrawRequested"),
        }
    }
}

#[derive(Default)]
pub struct EventBus {
    events: Vec<SceneEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: SceneEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<SceneEvent> {
        self.events.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
