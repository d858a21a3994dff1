//! Wand-driven navigation seam.
//!
//! The engine owns the arbitration and hands each frame to one strategy;
//! the strategies themselves live with the host, keyed by kind. Only one
//! user may hold the controls at a time.

use crate::context::CaveContext;
use crate::tracking::{ButtonState, Pose};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlModeKind {
    None,
    WandFly,
    Orbit,
    TableDrag,
}

impl fmt::Display for ControlModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlModeKind::None => write!(f, "none"),
            ControlModeKind::WandFly => write!(f, "wand_fly"),
            ControlModeKind::Orbit => write!(f, "orbit"),
            ControlModeKind::TableDrag => write!(f, "table_drag"),
        }
    }
}

impl FromStr for ControlModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ControlModeKind::None),
            "wand_fly" => Ok(ControlModeKind::WandFly),
            "orbit" => Ok(ControlModeKind::Orbit),
            "table_drag" => Ok(ControlModeKind::TableDrag),
            other => Err(format!("unknown control mode '{other}'")),
        }
    }
}

impl Default for ControlModeKind {
    fn default() -> Self {
        ControlModeKind::None
    }
}

/// Everything a strategy sees for one user on one frame.
pub struct ControlInput {
    pub glasses: Pose,
    pub wand: Pose,
    pub action: ButtonState,
    pub speed: f32,
    pub dt: f32,
}

/// A navigation strategy. Returns true while it is actively steering,
/// which claims the controls for the calling user.
pub trait ControlMode: Send {
    fn apply(&mut self, ctx: &mut CaveContext, input: &ControlInput) -> bool;
}

/// Maps the selected kind to its strategy and arbitrates between users.
#[derive(Default)]
pub struct ControlDispatch {
    modes: HashMap<ControlModeKind, Box<dyn ControlMode>>,
    selected: ControlModeKind,
    claimed_by: Option<usize>,
}

impl ControlDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ControlModeKind, mode: Box<dyn ControlMode>) {
        self.modes.insert(kind, mode);
    }

    pub fn select(&mut self, kind: ControlModeKind) {
        if kind != self.selected {
            self.selected = kind;
            self.claimed_by = None;
        }
    }

    pub fn selected(&self) -> ControlModeKind {
        self.selected
    }

    /// User currently steering, if any.
    pub fn claimed_by(&self) -> Option<usize> {
        self.claimed_by
    }

    /// Runs the selected strategy for `user`, unless another user already
    /// holds the controls.
    pub fn apply(&mut self, user: usize, ctx: &mut CaveContext, input: &ControlInput) -> bool {
        if self.selected == ControlModeKind::None {
            return false;
        }
        if self.claimed_by.is_some_and(|owner| owner != user) {
            return false;
        }
        let Some(mode) = self.modes.get_mut(&self.selected) else {
            return false;
        };
        let active = mode.apply(ctx, input);
        self.claimed_by = active.then_some(user);
        active
    }
}
