//! GPU timing of command buffer regions.
//!
//! A [`CmdTimingRecorder`] writes a pair of timestamps around every region
//! opened with it. Results become readable once the command buffer that
//! recorded them has completed.

use std::sync::Arc;

use crate::backend::QueryPoolHandle;
use crate::commands::{CmdBufferRecorder, ResourceFence};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::lifetime::ManagedResource;

/// Measured duration of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneTiming {
    pub name: String,
    /// Nesting depth, 0 for outermost regions.
    pub depth: u32,
    pub duration_ns: f64,
}

#[derive(Debug, Clone)]
struct TimingZone {
    name: String,
    depth: u32,
    begin: u32,
    ended: bool,
}

/// Timestamp queries for the regions of one command buffer.
pub struct CmdTimingRecorder {
    device: Arc<GraphicsDevice>,
    query_pool: QueryPoolHandle,
    capacity: u32,
    next_query: u32,
    zones: Vec<TimingZone>,
    /// Open zones. `None` for zones that ran out of queries.
    open: Vec<Option<usize>>,
    fence: Option<ResourceFence>,
    results: Option<Vec<ZoneTiming>>,
    overflowed: bool,
}

impl CmdTimingRecorder {
    /// Create a recorder able to time `max_zones` regions.
    pub fn new(device: &Arc<GraphicsDevice>, max_zones: u32) -> Result<Self, GraphicsError> {
        if max_zones == 0 {
            return Err(GraphicsError::InvalidParameter(
                "timing recorder needs at least one zone".to_string(),
            ));
        }
        let capacity = max_zones * 2;
        let query_pool = device.backend().create_query_pool(capacity)?;
        Ok(Self {
            device: Arc::clone(device),
            query_pool,
            capacity,
            next_query: 0,
            zones: Vec::new(),
            open: Vec::new(),
            fence: None,
            results: None,
            overflowed: false,
        })
    }

    /// # Panics
    ///
    /// Panics if the recorder was already used with another command buffer.
    pub fn begin_zone(&mut self, recorder: &mut CmdBufferRecorder, name: &str) {
        let fence = recorder.resource_fence();
        match self.fence {
            Some(existing) => assert_eq!(
                existing, fence,
                "CmdTimingRecorder used with more than one command buffer"
            ),
            None => self.fence = Some(fence),
        }

        if self.next_query + 2 > self.capacity {
            if !self.overflowed {
                log::warn!("Out of timestamp queries, \"{name}\" and later zones will not be timed");
                self.overflowed = true;
            }
            self.open.push(None);
            return;
        }

        let begin = self.next_query;
        self.next_query += 2;
        recorder.write_timestamp(self.query_pool, begin);
        self.open.push(Some(self.zones.len()));
        self.zones.push(TimingZone {
            name: name.to_string(),
            depth: self.open.len() as u32 - 1,
            begin,
            ended: false,
        });
    }

    /// # Panics
    ///
    /// Panics if no zone is open.
    pub fn end_zone(&mut self, recorder: &mut CmdBufferRecorder) {
        let Some(zone) = self.open.pop() else {
            panic!("end_zone without matching begin_zone");
        };
        if let Some(index) = zone {
            let zone = &mut self.zones[index];
            recorder.write_timestamp(self.query_pool, zone.begin + 1);
            zone.ended = true;
        }
    }

    /// Number of zones that got timestamp queries.
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Returns true once the command buffer holding the timestamps has
    /// completed.
    pub fn is_data_ready(&self) -> bool {
        let Some(fence) = self.fence else {
            return false;
        };
        let lifetime = self.device.lifetime();
        lifetime.collect();
        lifetime.is_complete(fence)
    }

    /// Returns true while results are still expected. Consumers displaying
    /// the timings should stay alive until this turns false.
    pub fn should_keep_alive(&self) -> bool {
        self.fence.is_some() && self.results.is_none()
    }

    /// Read back the zone durations, or `None` if the device hasn't finished
    /// yet. Zones left open are skipped.
    pub fn resolve(&mut self) -> Result<Option<&[ZoneTiming]>, GraphicsError> {
        if self.results.is_none() {
            if !self.is_data_ready() {
                return Ok(None);
            }
            debug_assert!(self.open.is_empty(), "resolving timings with open zones");

            let timestamps = self
                .device
                .backend()
                .read_timestamps(self.query_pool, self.next_query)?;
            let period = self.device.properties().timestamp_period_ns;

            let results = self
                .zones
                .iter()
                .filter(|zone| zone.ended)
                .map(|zone| {
                    let begin = timestamps[zone.begin as usize];
                    let end = timestamps[zone.begin as usize + 1];
                    ZoneTiming {
                        name: zone.name.clone(),
                        depth: zone.depth,
                        duration_ns: end.saturating_sub(begin) as f64 * f64::from(period),
                    }
                })
                .collect();
            self.results = Some(results);
        }
        Ok(self.results.as_deref())
    }
}

impl Drop for CmdTimingRecorder {
    fn drop(&mut self) {
        self.device
            .lifetime()
            .destroy_later(ManagedResource::QueryPool(self.query_pool));
    }
}

impl std::fmt::Debug for CmdTimingRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmdTimingRecorder")
            .field("capacity", &self.capacity)
            .field("zones", &self.zones.len())
            .field("fence", &self.fence)
            .finish_non_exhaustive()
    }
}
