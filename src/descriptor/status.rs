//! Load status state machine for document descriptors.
//!
//! Every descriptor moves along a single forward path:
//!
//! ```text
//! CREATED -> REQUESTED -> LOADING -> { LOADED | LOAD_ERROR | INVALID }
//! ```
//!
//! The only backward edge is the explicit retry edge
//! `LOADED | LOAD_ERROR -> REQUESTED`. Anything else is rejected by
//! [`LoadStatus::can_move_to`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Loading status of a single document descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    /// Descriptor exists, no load attempted.
    Created,
    /// Load accepted and queued.
    Requested,
    /// A worker is reading the document metadata.
    Loading,
    /// Metadata read succeeded.
    Loaded,
    /// The underlying read failed (I/O error, protected document).
    LoadError,
    /// The path does not hold a usable document.
    Invalid,
}

impl LoadStatus {
    /// Check whether moving from `self` to `next` is a legal transition.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdfload::descriptor::LoadStatus;
    ///
    /// assert!(LoadStatus::Created.can_move_to(LoadStatus::Requested));
    /// assert!(!LoadStatus::Created.can_move_to(LoadStatus::Loaded));
    /// assert!(LoadStatus::LoadError.can_move_to(LoadStatus::Requested));
    /// assert!(!LoadStatus::Invalid.can_move_to(LoadStatus::Requested));
    /// ```
    pub fn can_move_to(self, next: LoadStatus) -> bool {
        use LoadStatus::*;

        matches!(
            (self, next),
            (Created, Requested)
                | (Requested, Loading)
                | (Loading, Loaded | LoadError | Invalid)
                | (Loaded | LoadError, Requested)
        )
    }

    /// Terminal states see no further automatic transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Loaded | Self::LoadError | Self::Invalid)
    }

    /// True while a load for the descriptor is queued or running.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Requested | Self::Loading)
    }

    /// True for the terminal states that represent a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::LoadError | Self::Invalid)
    }

    /// Stable upper-case name, as used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Requested => "REQUESTED",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::LoadError => "LOAD_ERROR",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
