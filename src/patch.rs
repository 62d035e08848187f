//! Assembling a patch: the fixture inventory with collision-checked
//! addressing.
//!
//! Every fixture resolves against a declared type, getting one shared coder
//! set per type. Address ranges are validated per universe so two fixtures
//! can never fight over a channel.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};
use itertools::Itertools;
use log::info;

use crate::coder::ChannelCoders;
use crate::config::{FixtureConfig, PatchConfig};
use crate::dmx::{DmxAddr, UniverseIdx};
use crate::fade::FadeTiming;
use crate::light::Light;

/// A fixture resolved against its type and validated into the patch.
pub struct PatchedFixture {
    pub name: String,
    pub fixture_type: String,
    pub universe: UniverseIdx,
    pub addr: DmxAddr,
    pub channel_count: usize,
}

impl PatchedFixture {
    /// The buffer index range this fixture occupies in its universe.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.addr.span(self.channel_count)
    }
}

/// The full fixture inventory.
///
/// Holds one coder set per fixture type and the global fade defaults, and
/// mints light entities for patched fixtures.
pub struct Patch {
    types: HashMap<String, Rc<ChannelCoders>>,
    fixtures: Vec<PatchedFixture>,
    used_addrs: UsedAddrs,
    timing: FadeTiming,
    poll_interval: Duration,
    default_transition: Duration,
    default_color_temp: f64,
}

impl Patch {
    /// Initialize a patch from a patch file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::patch_all(&PatchConfig::from_file(path)?)
    }

    /// Initialize a patch from a parsed config.
    pub fn patch_all(cfg: &PatchConfig) -> Result<Self> {
        ensure!(
            cfg.fade_hz.is_finite() && cfg.fade_hz > 0.,
            "fade_hz must be positive, got {}",
            cfg.fade_hz
        );
        ensure!(
            cfg.poll_hz.is_finite() && cfg.poll_hz > 0.,
            "poll_hz must be positive, got {}",
            cfg.poll_hz
        );
        ensure!(
            cfg.notify_interval_secs.is_finite() && cfg.notify_interval_secs >= 0.,
            "notify_interval_secs must be non-negative, got {}",
            cfg.notify_interval_secs
        );
        ensure!(
            cfg.default_transition_secs.is_finite() && cfg.default_transition_secs >= 0.,
            "default_transition_secs must be non-negative, got {}",
            cfg.default_transition_secs
        );
        let mut types = HashMap::new();
        for type_cfg in &cfg.types {
            let coders = ChannelCoders::new(type_cfg)?;
            ensure!(
                types
                    .insert(type_cfg.name.clone(), Rc::new(coders))
                    .is_none(),
                "duplicate fixture type \"{}\"",
                type_cfg.name
            );
        }
        let mut patch = Self {
            types,
            fixtures: Vec::new(),
            used_addrs: Default::default(),
            timing: FadeTiming {
                recompute_hz: cfg.fade_hz,
                notify_interval: Duration::from_secs_f64(cfg.notify_interval_secs),
            },
            poll_interval: Duration::from_secs_f64(1. / cfg.poll_hz),
            default_transition: Duration::from_secs_f64(cfg.default_transition_secs),
            default_color_temp: cfg.default_color_temp_kelvin,
        };
        for fixture in &cfg.fixtures {
            patch
                .patch_one(fixture)
                .with_context(|| format!("patching \"{}\"", fixture.name))?;
        }
        Ok(patch)
    }

    fn patch_one(&mut self, cfg: &FixtureConfig) -> Result<()> {
        let Some(coders) = self.types.get(&cfg.fixture_type) else {
            bail!(
                "unknown fixture type \"{}\" (have: {})",
                cfg.fixture_type,
                self.types.keys().sorted().join(", ")
            );
        };
        ensure!(
            !self.fixtures.iter().any(|f| f.name == cfg.name),
            "duplicate fixture name \"{}\"",
            cfg.name
        );
        let channel_count = coders.channel_count();
        cfg.addr.validate_span(channel_count)?;
        self.used_addrs.allocate(
            &cfg.fixture_type,
            cfg.universe,
            cfg.addr.dmx_index(),
            channel_count,
        )?;
        info!(
            "Controlling \"{}\" ({}, {} channel(s)) at {} in universe {}.",
            cfg.name, cfg.fixture_type, channel_count, cfg.addr, cfg.universe
        );
        self.fixtures.push(PatchedFixture {
            name: cfg.name.clone(),
            fixture_type: cfg.fixture_type.clone(),
            universe: cfg.universe,
            addr: cfg.addr,
            channel_count,
        });
        Ok(())
    }

    /// Dynamically get the universe count.
    ///
    /// Based on the highest universe any fixture is patched in; lower
    /// universes may be empty.
    pub fn universe_count(&self) -> usize {
        self.fixtures
            .iter()
            .map(|f| f.universe)
            .max()
            .unwrap_or_default()
            + 1
    }

    /// Get the patched fixture with this name.
    pub fn get(&self, name: &str) -> Result<&PatchedFixture> {
        self.fixtures
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| anyhow!("fixture \"{name}\" not found in patch"))
    }

    /// Iterate over all patched fixtures.
    pub fn iter(&self) -> impl Iterator<Item = &PatchedFixture> {
        self.fixtures.iter()
    }

    /// Create the light entity for a patched fixture.
    pub fn create_light(&self, name: &str) -> Result<Light> {
        let fixture = self.get(name)?;
        let coders = &self.types[&fixture.fixture_type];
        Ok(Light::new(
            fixture.name.clone(),
            Rc::clone(coders),
            self.timing,
            self.default_transition,
            self.default_color_temp,
        ))
    }

    /// How long the driver should sleep between controller polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Which DMX addrs already have a fixture patched in them, by fixture type
/// and starting address.
#[derive(Default)]
struct UsedAddrs(HashMap<(UniverseIdx, usize), (String, usize)>);

impl UsedAddrs {
    /// Attempt to allocate the requested addresses for a fixture type.
    ///
    /// The addresses are only allocated if there are no conflicts.
    fn allocate(
        &mut self,
        fixture_type: &str,
        universe: UniverseIdx,
        start_dmx_index: usize,
        channel_count: usize,
    ) -> Result<()> {
        for this_index in start_dmx_index..start_dmx_index + channel_count {
            if let Some((existing_type, patched_at)) = self.0.get(&(universe, this_index)) {
                bail!(
                    "{fixture_type} at {} overlaps at DMX address {} in universe {universe} with {existing_type} at {}",
                    start_dmx_index + 1,
                    this_index + 1,
                    patched_at + 1,
                );
            }
        }
        // No conflicts; allocate addresses.
        for this_index in start_dmx_index..start_dmx_index + channel_count {
            self.0.insert(
                (universe, this_index),
                (fixture_type.to_string(), start_dmx_index),
            );
        }
        Ok(())
    }
}
