//! This module contains the line based commands of the control port.
//!
//! A line is split on whitespace, the first token picks the command and the rest are its arguments:
//!
//! | Line                       | Effect                                                 |
//! |----------------------------|--------------------------------------------------------|
//! | `PATCH a0 a1 ...`          | patch universe `ai` to slot `i`                        |
//! | `OFFSETS o0 o1 ...`        | let slot `i` start at LED `oi`                         |
//! | `ACTIVE_LEDS n`            | drive `n` LEDs, needs a restart                        |
//! | `NUM_UNIS n`               | use `n` slots, needs a restart                         |
//!
//! Keywords are case sensitive. Anything else is ignored.

use heapless::Vec;

use crate::{definitions::MAX_UNIVERSES, patch_table::PatchTable, port_address::PortAddress};

/// A parsed control line
///
/// Arguments that are not numbers, or out of range for their command, are kept as `None` so later
/// arguments still end up in the right slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PATCH`, one entry per slot starting at slot 0.
    Patch(Vec<Option<PortAddress>, MAX_UNIVERSES>),
    /// `OFFSETS`, one entry per slot starting at slot 0.
    Offsets(Vec<Option<u16>, MAX_UNIVERSES>),
    /// `ACTIVE_LEDS`, `None` if the argument is missing or not a number.
    ActiveLeds(Option<u16>),
    /// `NUM_UNIS`, `None` if the argument is missing or not a number.
    NumUnis(Option<u16>),
    /// Blank lines and unknown keywords
    Unknown,
}

/// What has to happen after a command was applied
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The command was rejected or ignored.
    Unchanged,
    /// The table changed and has to be saved.
    Persist,
    /// The table changed, has to be saved and the node restarted for it to take effect.
    PersistAndRestart,
}

impl Outcome {
    /// True if the table has to be saved.
    pub const fn persists(&self) -> bool {
        matches!(self, Self::Persist | Self::PersistAndRestart)
    }

    /// True if the node has to be restarted.
    pub const fn restarts(&self) -> bool {
        matches!(self, Self::PersistAndRestart)
    }
}

impl Command {
    /// Parses a single line, without its line terminator.
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            return Self::Unknown;
        };

        match keyword {
            "PATCH" => Self::Patch(
                tokens
                    .take(MAX_UNIVERSES)
                    .map(|t| t.parse::<u16>().ok().and_then(|raw| PortAddress::new(raw).ok()))
                    .collect(),
            ),
            "OFFSETS" => Self::Offsets(tokens.take(MAX_UNIVERSES).map(|t| t.parse().ok()).collect()),
            "ACTIVE_LEDS" => Self::ActiveLeds(tokens.next().and_then(|t| t.parse().ok())),
            "NUM_UNIS" => Self::NumUnis(tokens.next().and_then(|t| t.parse().ok())),
            _ => Self::Unknown,
        }
    }

    /// Applies the command to `table`.
    ///
    /// `PATCH` and `OFFSETS` always persist, even if every argument was rejected.
    /// `ACTIVE_LEDS` and `NUM_UNIS` only change anything if their argument is accepted, see
    /// [PatchTable::set_active_led_count] and [PatchTable::set_universe_count].
    pub fn apply(&self, table: &mut PatchTable) -> Outcome {
        match self {
            Self::Patch(addresses) => {
                table.set_patch(addresses);
                Outcome::Persist
            }
            Self::Offsets(offsets) => {
                table.set_offsets(offsets);
                Outcome::Persist
            }
            Self::ActiveLeds(Some(count)) if table.set_active_led_count(*count) => Outcome::PersistAndRestart,
            Self::NumUnis(Some(count)) if table.set_universe_count(*count) => Outcome::PersistAndRestart,
            Self::ActiveLeds(_) | Self::NumUnis(_) | Self::Unknown => Outcome::Unchanged,
        }
    }
}
