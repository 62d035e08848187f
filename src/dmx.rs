use std::fmt::Display;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// A DMX address, indexed from 1.
///
/// Range checking happens downstream in [`validate_span`](Self::validate_span)
/// rather than at parse time, so a bad patch file fails with a message naming
/// the fixture instead of an obscure deserializer error.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub struct DmxAddr(usize);

impl DmxAddr {
    /// Get the DMX buffer index of this address (indexed from 0).
    pub fn dmx_index(&self) -> usize {
        self.0 - 1
    }

    /// Ensure this address plus a channel span of the given width fits in a
    /// universe.
    pub fn validate_span(&self, channel_count: usize) -> Result<()> {
        ensure!(
            (1..=512).contains(&self.0),
            "invalid DMX address {}",
            self.0
        );
        ensure!(
            self.0 + channel_count - 1 <= 512,
            "DMX address {} with {channel_count} channels extends past the end of the universe",
            self.0
        );
        Ok(())
    }

    /// The half-open buffer index range covered by a span of the given width
    /// starting at this address.
    pub fn span(&self, channel_count: usize) -> std::ops::Range<usize> {
        self.dmx_index()..self.dmx_index() + channel_count
    }
}

impl Display for DmxAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A data buffer for one DMX universe.
pub type DmxBuffer = [u8; 512];

/// Index into the DMX universes.
pub type UniverseIdx = usize;
