use crate::editing::EditEngine;
use crate::events::{EventBus, SceneEvent};
use crate::renderer::Renderer;
use crate::scene::SceneContainer;

/// The currently active interaction behavior. Viewing is the neutral
/// state every other mode toggles back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Viewing,
    Selection,
    Drawing,
    Curve,
    MeshAdd,
    MeshDelete,
    Picking,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Viewing => "Viewing",
            Mode::Selection => "Selection",
            Mode::Drawing => "Drawing",
            Mode::Curve => "Curve",
            Mode::MeshAdd => "MeshAdd",
            Mode::MeshDelete => "MeshDelete",
            Mode::Picking => "Picking",
        }
    }

    /// Cursor indicator color shown while the mode is active; `None`
    /// keeps the default arrow. Deterministic per mode so the shell and
    /// the tests agree on it.
    pub fn cursor_color(self) -> Option<[u8; 3]> {
        match self {
            Mode::Viewing => None,
            Mode::Selection => Some([0x21, 0x96, 0xF3]),
            Mode::Drawing => Some([0xFF, 0xC1, 0x07]),
            Mode::Curve => Some([0xAB, 0xAB, 0xAB]),
            Mode::MeshAdd => Some([0xCA, 0xCA, 0xCA]),
            Mode::MeshDelete => Some([0xFF, 0xFF, 0xFF]),
            Mode::Picking => Some([0x9C, 0x27, 0xB0]),
        }
    }

    /// Modes that leave transient markers/overlays behind and therefore
    /// need explicit cleanup on exit.
    fn needs_cleanup(self) -> bool {
        matches!(self, Mode::MeshAdd | Mode::MeshDelete | Mode::Curve)
    }
}

/// Tracks the active mode and mediates transitions: exactly one mode is
/// active at a time, entering a mode while another is active first runs
/// that mode's exit cleanup, and re-requesting the active mode toggles
/// back to Viewing.
#[derive(Debug, Default)]
pub struct ModeMachine {
    current: Mode,
}

impl ModeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    /// Total over the closed mode set; returns the mode actually entered.
    pub fn transition(
        &mut self,
        new_mode: Mode,
        engine: &mut EditEngine,
        clusters: &mut SceneContainer,
        renderer: &mut dyn Renderer,
        events: &mut EventBus,
    ) -> Mode {
        let current = self.current;
        if current.needs_cleanup() {
            engine.cleanup(renderer);
        }
        engine.clear_drawing_target();

        if current == new_mode {
            self.current = Mode::Viewing;
        } else {
            self.current = new_mode;
            if new_mode == Mode::Drawing {
                if let Err(message) = engine.begin_drawing(clusters) {
                    events.push(SceneEvent::status(message));
                    self.current = Mode::Viewing;
                }
            }
        }

        events.push(SceneEvent::ModeChanged { mode: self.current });
        events.push(SceneEvent::status(format!("Mode: {}", self.current.label())));
        self.current
    }
}
