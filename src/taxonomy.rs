//! Attention class taxonomy.
//!
//! The five ordinal attention levels and their display colours live in a
//! single constant table so the name and colour of a class can never drift
//! apart.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of attention classes predicted by the classifier.
pub const CLASS_COUNT: usize = 5;

/// Display colour bound to an attention class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassColour {
    /// Colour name as used in legends and reports.
    pub name: &'static str,
    /// 8-bit RGB components.
    pub rgb: [u8; 3],
}

/// Ordinal level of viewer attention at a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AttentionClass {
    None,
    Low,
    MediumLow,
    MediumHigh,
    High,
}

/// Returned when a raw label falls outside `0..CLASS_COUNT`.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("attention class {0} is outside the range 0..=4")]
pub struct InvalidClass(pub usize);

struct ClassEntry {
    class: AttentionClass,
    label: &'static str,
    colour: ClassColour,
}

const TABLE: [ClassEntry; CLASS_COUNT] = [
    ClassEntry {
        class: AttentionClass::None,
        label: "No attention",
        colour: ClassColour {
            name: "blue",
            rgb: [0, 0, 255],
        },
    },
    ClassEntry {
        class: AttentionClass::Low,
        label: "Low",
        colour: ClassColour {
            name: "green",
            rgb: [0, 128, 0],
        },
    },
    ClassEntry {
        class: AttentionClass::MediumLow,
        label: "Medium-low",
        colour: ClassColour {
            name: "yellow",
            rgb: [255, 255, 0],
        },
    },
    ClassEntry {
        class: AttentionClass::MediumHigh,
        label: "Medium-high",
        colour: ClassColour {
            name: "orange",
            rgb: [255, 165, 0],
        },
    },
    ClassEntry {
        class: AttentionClass::High,
        label: "High",
        colour: ClassColour {
            name: "red",
            rgb: [255, 0, 0],
        },
    },
];

impl AttentionClass {
    /// All classes in ordinal order.
    pub const ALL: [Self; CLASS_COUNT] = [
        Self::None,
        Self::Low,
        Self::MediumLow,
        Self::MediumHigh,
        Self::High,
    ];

    /// Ordinal index in `0..CLASS_COUNT`.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look up a class by ordinal index.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidClass`] when `index >= CLASS_COUNT`.
    pub fn from_index(index: usize) -> Result<Self, InvalidClass> {
        TABLE
            .get(index)
            .map(|entry| entry.class)
            .ok_or(InvalidClass(index))
    }

    /// Human-readable class name, e.g. `"Medium-low"`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        TABLE[self.index()].label
    }

    /// Display colour for the class.
    #[must_use]
    pub const fn colour(self) -> ClassColour {
        TABLE[self.index()].colour
    }
}

impl TryFrom<u8> for AttentionClass {
    type Error = InvalidClass;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(usize::from(value))
    }
}

impl From<AttentionClass> for u8 {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "class indices are below CLASS_COUNT"
    )]
    fn from(class: AttentionClass) -> Self {
        class.index() as u8
    }
}

impl fmt::Display for AttentionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
