//! Boot-time autostart scan state.
//!
//! The scan itself runs through the navigator (it needs the card mounted
//! and the flat find machinery); this module owns the once-per-boot gate
//! and the generated file pattern.

use core::fmt::Write as _;

use heapless::String;

use crate::SHORT_NAME_MAX;

/// Default host-connection grace after reset before the scan may fire.
pub const BOOT_GRACE_MS: u64 = 5_000;

pub struct AutostartState {
    /// Cleared unconditionally by the first attempt, match or not.
    pub still_to_check: bool,
    /// Next file index to look for; `None` disables autostart for the
    /// rest of the session.
    pub index: Option<u8>,
}

impl AutostartState {
    pub const fn new() -> Self {
        Self {
            still_to_check: true,
            index: Some(0),
        }
    }

    /// Advance to the next boot's index, saturating into disabled.
    pub fn advance(&mut self) {
        self.index = self.index.and_then(|index| index.checked_add(1));
    }

    pub fn disable(&mut self) {
        self.index = None;
    }
}

impl Default for AutostartState {
    fn default() -> Self {
        Self::new()
    }
}

/// `auto<index>.g`, matched case-insensitively against root entries.
pub fn pattern(index: u8) -> String<SHORT_NAME_MAX> {
    let mut out: String<SHORT_NAME_MAX> = String::new();
    let _ = write!(out, "auto{}.g", index);
    out
}
