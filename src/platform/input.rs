//! Host input surface used for synthetic pointer moves during replay.

use std::sync::Mutex;

use crate::lock_unpoisoned;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn center(&self) -> PointerPosition {
        PointerPosition {
            x: self.width / 2.0,
            y: self.height / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

/// Point on the circle of `radius` around the viewport center at
/// `angle_degrees`.
pub fn pointer_for_angle(viewport: Viewport, angle_degrees: f64, radius: f64) -> PointerPosition {
    let center = viewport.center();
    let radians = angle_degrees.to_radians();
    PointerPosition {
        x: center.x + radius * radians.cos(),
        y: center.y + radius * radians.sin(),
    }
}

pub trait InputSurface: Send + Sync {
    /// `None` when no render target is available; pointer moves are skipped.
    fn viewport(&self) -> Option<Viewport>;

    /// Suppresses real user pointer input while replay drives the view.
    fn set_user_input_blocked(&self, blocked: bool);

    fn dispatch_pointer_move(&self, position: PointerPosition);
}

/// Input surface for hosts without a view.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessInput;

impl InputSurface for HeadlessInput {
    fn viewport(&self) -> Option<Viewport> {
        None
    }

    fn set_user_input_blocked(&self, _blocked: bool) {}

    fn dispatch_pointer_move(&self, _position: PointerPosition) {}
}

/// Records every interaction; for tests and diagnostics.
#[derive(Debug)]
pub struct RecordingInputSurface {
    viewport: Option<Viewport>,
    blocked: Mutex<bool>,
    block_changes: Mutex<Vec<bool>>,
    moves: Mutex<Vec<PointerPosition>>,
}

impl RecordingInputSurface {
    pub fn new(viewport: Option<Viewport>) -> Self {
        Self {
            viewport,
            blocked: Mutex::new(false),
            block_changes: Mutex::new(Vec::new()),
            moves: Mutex::new(Vec::new()),
        }
    }

    pub fn is_blocked(&self) -> bool {
        *lock_unpoisoned(&self.blocked)
    }

    pub fn block_changes(&self) -> Vec<bool> {
        lock_unpoisoned(&self.block_changes).clone()
    }

    pub fn moves(&self) -> Vec<PointerPosition> {
        lock_unpoisoned(&self.moves).clone()
    }
}

impl InputSurface for RecordingInputSurface {
    fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    fn set_user_input_blocked(&self, blocked: bool) {
        *lock_unpoisoned(&self.blocked) = blocked;
        lock_unpoisoned(&self.block_changes).push(blocked);
    }

    fn dispatch_pointer_move(&self, position: PointerPosition) {
        lock_unpoisoned(&self.moves).push(position);
    }
}
