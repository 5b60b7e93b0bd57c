//! Key bindings: a keysym name plus the modifiers held with it.
//!
//! A binding is written as `"+"`-separated elements, any number of
//! modifier names (case-insensitive) and exactly one xkb keysym name
//! (case-sensitive, as printed by `xkbcli`), e.g. `"ctrl+shift+Return"`.
//!
//! Modifiers that xkb consumed to produce the keysym are not part of the
//! pressed key, so a shifted `h` is written `"H"`, not `"shift+h"`.

use crate::command::Command;
use bitflags::bitflags;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// The eight core X11 modifiers, in xkb's order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CAPS = 1 << 1;
        const CTRL = 1 << 2;
        const ALT = 1 << 3;
        const NUM = 1 << 4;
        const MOD3 = 1 << 5;
        const LOGO = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

impl Modifiers {
    /// Lock modifiers, ignored when no binding names them.
    pub const LOCKS: Modifiers = Modifiers::CAPS.union(Modifiers::NUM);

    /// Config names, in display order.
    pub const NAMES: [(&'static str, Modifiers); 8] = [
        ("shift", Modifiers::SHIFT),
        ("caps", Modifiers::CAPS),
        ("ctrl", Modifiers::CTRL),
        ("alt", Modifiers::ALT),
        ("num", Modifiers::NUM),
        ("mod3", Modifiers::MOD3),
        ("logo", Modifiers::LOGO),
        ("mod5", Modifiers::MOD5),
    ];

    /// Look up a single modifier by its config name, ignoring case.
    pub fn from_config_name(s: &str) -> Option<Modifiers> {
        Self::NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|&(_, flag)| flag)
    }
}

/// Why a binding string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyBindingError {
    #[error("duplicate modifier {element:?} in {binding:?}")]
    DuplicateModifier { binding: String, element: String },
    #[error("more than one key in {0:?}")]
    TooManyKeys(String),
    #[error("no key in {0:?}")]
    NoKey(String),
    #[error("empty element in {0:?}")]
    Empty(String),
}

/// A keysym name with the modifiers that must be active.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub modifiers: Modifiers,
    pub keysym: String,
}

impl KeyBinding {
    pub fn new(modifiers: Modifiers, keysym: impl Into<String>) -> Self {
        Self {
            modifiers,
            keysym: keysym.into(),
        }
    }
}

impl FromStr for KeyBinding {
    type Err = KeyBindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modifiers = Modifiers::empty();
        let mut keysym = None;
        for element in s.split('+').map(str::trim) {
            if element.is_empty() {
                return Err(KeyBindingError::Empty(s.to_string()));
            }
            match Modifiers::from_config_name(element) {
                Some(flag) if modifiers.contains(flag) => {
                    return Err(KeyBindingError::DuplicateModifier {
                        binding: s.to_string(),
                        element: element.to_string(),
                    });
                }
                Some(flag) => modifiers |= flag,
                None if keysym.is_some() => {
                    return Err(KeyBindingError::TooManyKeys(s.to_string()));
                }
                None => keysym = Some(element),
            }
        }
        let keysym = keysym.ok_or_else(|| KeyBindingError::NoKey(s.to_string()))?;
        Ok(Self::new(modifiers, keysym))
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, flag) in Modifiers::NAMES {
            if self.modifiers.contains(flag) {
                write!(f, "{}+", name)?;
            }
        }
        f.write_str(&self.keysym)
    }
}

impl Serialize for KeyBinding {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyBinding {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}

//  Binding table

/// `key binding -> commands`, run in order on each press.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(HashMap<KeyBinding, Vec<Command>>);

impl Bindings {
    pub fn insert(&mut self, binding: KeyBinding, commands: Vec<Command>) {
        self.0.insert(binding, commands);
    }

    pub fn get(&self, binding: &KeyBinding) -> Option<&[Command]> {
        self.0.get(binding).map(Vec::as_slice)
    }

    /// Commands for `keysym` pressed with `modifiers` active.
    ///
    /// An exact match wins. Otherwise active lock modifiers are dropped
    /// and the lookup is retried, so Num Lock does not disable plain keys.
    pub fn lookup(&self, modifiers: Modifiers, keysym: &str) -> Option<&[Command]> {
        let mut key = KeyBinding::new(modifiers, keysym);
        if let Some(commands) = self.get(&key) {
            return Some(commands);
        }
        if modifiers.intersects(Modifiers::LOCKS) {
            key.modifiers.remove(Modifiers::LOCKS);
            return self.get(&key);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyBinding, &[Command])> {
        self.0.iter().map(|(k, v)| (k, v.as_slice()))
    }
}

impl FromIterator<(KeyBinding, Vec<Command>)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (KeyBinding, Vec<Command>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A binding's value in the config: one command or a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Command),
    Many(Vec<Command>),
}

impl Serialize for Bindings {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for Bindings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = HashMap::<KeyBinding, OneOrMany>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(binding, value)| -> Result<_, D::Error> {
                let commands = match value {
                    OneOrMany::One(command) => vec![command],
                    OneOrMany::Many(commands) if commands.is_empty() => {
                        return Err(DeError::custom(format!("{} has no commands", binding)));
                    }
                    OneOrMany::Many(commands) => commands,
                };
                Ok((binding, commands))
            })
            .collect()
    }
}
