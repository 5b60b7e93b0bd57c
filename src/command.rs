//! Commands and types used throughout gridpoint.
//!
//! This module defines the vocabulary that all components share:
//! [`Command`] describes every action the navigator can perform, and
//! [`Direction`] / [`Button`] provide the supporting data types.
//!
//! Commands are written in kebab-case in the configuration file
//! (`"cut-left"`, `"move-down"`, `"right-click"`, …) and bound to keysym
//! names there.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Direction of a cut or move, relative to the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// The axis a [`Direction`] acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Direction {
    /// Axis along which this direction cuts or moves.
    pub fn axis(self) -> Axis {
        match self {
            Direction::Left | Direction::Right => Axis::Horizontal,
            Direction::Up | Direction::Down => Axis::Vertical,
        }
    }

    /// Whether the direction points towards the far edge (right / bottom)
    /// of the axis.
    pub fn is_far(self) -> bool {
        matches!(self, Direction::Right | Direction::Down)
    }

    fn from_name(s: &str) -> Option<Direction> {
        match s {
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Pointer button synthesized by clicks, presses and releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Left,
    Right,
    Middle,
}

impl Button {
    /// Linux input event code (`BTN_*`) for this button.
    pub fn code(self) -> u32 {
        const BTN_LEFT: u32 = 0x110;
        const BTN_RIGHT: u32 = 0x111;
        const BTN_MIDDLE: u32 = 0x112;

        match self {
            Button::Left => BTN_LEFT,
            Button::Right => BTN_RIGHT,
            Button::Middle => BTN_MIDDLE,
        }
    }

    fn from_name(s: &str) -> Option<Button> {
        match s {
            "left" => Some(Button::Left),
            "right" => Some(Button::Right),
            "middle" => Some(Button::Middle),
            _ => None,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::Left => write!(f, "left"),
            Button::Right => write!(f, "right"),
            Button::Middle => write!(f, "middle"),
        }
    }
}

/// Every action the navigator can perform.
///
/// Commands are produced by looking up a decoded key in the configured
/// bindings (one key may run several in order) and consumed by
/// [`Navigator::apply`](crate::navigator::Navigator::apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Narrow the selection, keeping the part towards `Direction`.
    Cut(Direction),

    /// Pan the selection towards `Direction` without resizing it.
    Move(Direction),

    /// Restore the selection as it was before the last cut or move.
    Undo,

    /// Move the pointer to the centre of the selection, click `Button`
    /// and exit.
    Click(Button),

    /// Move the pointer to the centre of the selection and hold `Button`
    /// down. Navigation continues, so a later `Release` ends a drag.
    Press(Button),

    /// Move the pointer to the centre of the selection and let go of
    /// `Button`.
    Release(Button),

    /// Move the pointer to the centre of the selection and scroll one
    /// wheel step.
    Scroll(Direction),

    /// Exit without touching the pointer.
    Quit,
}

impl Command {
    /// Parse the kebab-case name used in the configuration file.
    pub fn from_kebab_case(s: &str) -> Option<Command> {
        let s = s.trim();
        match s {
            "quit" => return Some(Command::Quit),
            "undo" => return Some(Command::Undo),
            _ => {}
        }
        match s.split_once('-')? {
            ("cut", dir) => Direction::from_name(dir).map(Command::Cut),
            ("move", dir) => Direction::from_name(dir).map(Command::Move),
            ("scroll", dir) => Direction::from_name(dir).map(Command::Scroll),
            (button, "click") => Button::from_name(button).map(Command::Click),
            (button, "press") => Button::from_name(button).map(Command::Press),
            (button, "release") => Button::from_name(button).map(Command::Release),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Cut(dir) => write!(f, "cut-{}", dir),
            Command::Move(dir) => write!(f, "move-{}", dir),
            Command::Undo => write!(f, "undo"),
            Command::Click(button) => write!(f, "{}-click", button),
            Command::Press(button) => write!(f, "{}-press", button),
            Command::Release(button) => write!(f, "{}-release", button),
            Command::Scroll(dir) => write!(f, "scroll-{}", dir),
            Command::Quit => write!(f, "quit"),
        }
    }
}

impl Serialize for Command {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Command::from_kebab_case(&s)
            .ok_or_else(|| DeError::custom(format!("invalid command: {:?}", s)))
    }
}
