// Consumer side of the pipeline: buffers to renderable point series
//
// A `StreamPlot` reads consistent snapshots of its x/y buffers on the display
// tick and feeds only the newly appended pairs into its `PointCollection`.
// Deltas are computed from the buffers' append counters rather than their
// lengths, so bounded ring buffers work as long as the consumer keeps up.

use crate::buffer::{BufferSnapshot, SampleBuffer};
use crate::error::{StreamError, StreamResult};
use crate::events::{ObserverId, UpdateFlag};
use crate::points::{Point, PointCollection, RenderPoint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a renderer has to do after an update
#[derive(Debug, Clone, PartialEq)]
pub enum PlotUpdate {
    /// Input buffers are empty; drop everything
    Cleared,
    /// Upload the full point set
    Replace {
        points: Vec<RenderPoint>,
        min: Point,
        max: Point,
    },
    /// Overwrite the last `replace` points with the head of `points`, then
    /// append the rest
    Append {
        points: Vec<RenderPoint>,
        replace: usize,
        min: Point,
        max: Point,
    },
}

/// Receives point uploads from a `StreamPlot`
pub trait PlotRenderer {
    fn set_points(&mut self, points: &[RenderPoint], min: Point, max: Point);

    fn append_points(&mut self, points: &[RenderPoint], replace: usize, min: Point, max: Point);
}

/// Headless renderer keeping a CPU-side copy of what was uploaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointMirror {
    pub points: Vec<RenderPoint>,
    pub min: Point,
    pub max: Point,
    pub uploads: usize,
}

impl PlotRenderer for PointMirror {
    fn set_points(&mut self, points: &[RenderPoint], min: Point, max: Point) {
        self.points = points.to_vec();
        self.min = min;
        self.max = max;
        self.uploads += 1;
    }

    fn append_points(&mut self, points: &[RenderPoint], replace: usize, min: Point, max: Point) {
        let keep = self.points.len().saturating_sub(replace);
        self.points.truncate(keep);
        self.points.extend_from_slice(points);
        self.min = min;
        self.max = max;
        self.uploads += 1;
    }
}

/// Serializable state of one plot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlotSummary {
    pub name: String,
    pub represented_points: usize,
    pub physical_points: usize,
    pub stride: usize,
    pub min: Point,
    pub max: Point,
    pub halted: bool,
}

pub struct StreamPlot {
    name: String,
    x_buffer: Option<Arc<SampleBuffer>>,
    y_buffer: Arc<SampleBuffer>,
    collection: PointCollection,
    max_points: usize,
    /// Logical pairs consumed so far, in buffer append-counter units
    consumed: u64,
    /// Clear generations of the (x, y) buffers the consumed pairs came from
    generations: (u64, u64),
    halted: bool,
    update_flag: UpdateFlag,
    subscriptions: Vec<(Arc<SampleBuffer>, ObserverId)>,
}

impl StreamPlot {
    pub fn new(
        name: impl Into<String>,
        x_buffer: Option<Arc<SampleBuffer>>,
        y_buffer: Arc<SampleBuffer>,
        log_x: bool,
        log_y: bool,
        max_points: usize,
    ) -> Self {
        let update_flag = UpdateFlag::new();
        let subscriptions = x_buffer
            .iter()
            .chain(std::iter::once(&y_buffer))
            .map(|buffer| {
                let id = buffer.subscribe_shared(update_flag.observer());
                (Arc::clone(buffer), id)
            })
            .collect();

        // Pick up whatever the buffers already hold on the first tick
        update_flag.raise();

        Self {
            name: name.into(),
            x_buffer,
            y_buffer,
            collection: PointCollection::new(log_x, log_y),
            max_points: max_points.max(2),
            consumed: 0,
            generations: (0, 0),
            halted: false,
            update_flag,
            subscriptions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &PointCollection {
        &self.collection
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn needs_update(&self) -> bool {
        self.update_flag.is_raised()
    }

    pub fn summary(&self) -> PlotSummary {
        PlotSummary {
            name: self.name.clone(),
            represented_points: self.collection.represented_point_count(),
            physical_points: self.collection.count(),
            stride: self.collection.stride(),
            min: self.collection.min(),
            max: self.collection.max(),
            halted: self.halted,
        }
    }

    /// Forget all consumed data and resume a halted plot
    pub fn reset(&mut self) {
        self.collection.remove_all();
        self.consumed = 0;
        self.halted = false;
        self.update_flag.raise();
    }

    /// Display-tick entry point: update only if a buffer signalled a change
    pub fn tick(&mut self) -> StreamResult<Option<PlotUpdate>> {
        if !self.update_flag.take() {
            return Ok(None);
        }
        self.update()
    }

    /// Pull new pairs from the buffers into the collection
    pub fn update(&mut self) -> StreamResult<Option<PlotUpdate>> {
        let y = self.y_buffer.snapshot();
        let x = self.x_buffer.as_ref().map(|buffer| buffer.snapshot());

        let generations = (x.as_ref().map_or(0, |x| x.generation), y.generation);
        let total = match &x {
            Some(x) => x.total_appended.min(y.total_appended),
            None => y.total_appended,
        };

        if total == 0 || y.values.is_empty() {
            let was_populated = !self.collection.is_empty() || self.consumed > 0;
            self.collection.remove_all();
            self.consumed = 0;
            self.generations = generations;
            self.halted = false;
            return Ok(was_populated.then_some(PlotUpdate::Cleared));
        }

        // A cleared buffer may have been refilled past the consumed count
        // between two ticks; the old points belong to data that is gone
        let mut rebuild = self.consumed == 0;
        if generations != self.generations {
            log::debug!("Plot '{}' source buffers were cleared; rebuilding", self.name);
            self.collection.remove_all();
            self.consumed = 0;
            self.generations = generations;
            self.halted = false;
            rebuild = true;
        }

        if self.halted {
            return Ok(None);
        }

        if total < self.consumed {
            let violation = StreamError::InvariantViolation(format!(
                "plot '{}' consumed {} values but buffers report {}",
                self.name, self.consumed, total
            ));
            log::warn!("{}; rebuilding", violation);
            self.collection.remove_all();
            self.consumed = 0;
            rebuild = true;
        }

        let added = total - self.consumed;
        if added == 0 {
            return Ok(None);
        }

        let available_from = first_index(&y).max(x.as_ref().map_or(0, first_index));
        let mut start = self.consumed;
        if start < available_from {
            if !rebuild {
                let memory = self
                    .x_buffer
                    .iter()
                    .chain(std::iter::once(&self.y_buffer))
                    .filter_map(|buffer| buffer.memory_count())
                    .min()
                    .unwrap_or(0);
                self.halted = true;
                let err = StreamError::CapacityExceeded {
                    added: added as usize,
                    memory,
                };
                log::warn!("Plot '{}' halted: {}", self.name, err);
                return Err(err);
            }
            // A fresh view of a ring buffer starts at its oldest value
            start = available_from;
        }

        let y_first = first_index(&y);
        let x_first = x.as_ref().map_or(0, first_index);
        let pairs = (start..total).map(|i| {
            let y_value = y.values[(i - y_first) as usize];
            let x_value = match &x {
                Some(x) => x.values[(i - x_first) as usize],
                None => i as f64,
            };
            (x_value, y_value)
        });

        let (replaced, added_points) = self.collection.append(pairs);
        self.consumed = total;

        let factor = self.collection.count() / (self.max_points / 2);
        if factor > 1 {
            self.collection.factor_stride(factor);
            log::debug!(
                "Plot '{}' decimated by {} to stride {} ({} points)",
                self.name,
                factor,
                self.collection.stride(),
                self.collection.count()
            );
            return Ok(Some(self.full_update()));
        }

        if rebuild {
            return Ok(Some(self.full_update()));
        }

        Ok(Some(PlotUpdate::Append {
            points: self.collection.render_suffix(added_points + replaced),
            replace: replaced,
            min: self.collection.min(),
            max: self.collection.max(),
        }))
    }

    fn full_update(&self) -> PlotUpdate {
        PlotUpdate::Replace {
            points: self.collection.render_points(),
            min: self.collection.min(),
            max: self.collection.max(),
        }
    }

    /// Apply an update to a renderer
    pub fn render_to<R: PlotRenderer + ?Sized>(update: &PlotUpdate, renderer: &mut R) {
        match update {
            PlotUpdate::Cleared => renderer.set_points(&[], Point::ZERO, Point::ZERO),
            PlotUpdate::Replace { points, min, max } => renderer.set_points(points, *min, *max),
            PlotUpdate::Append {
                points,
                replace,
                min,
                max,
            } => renderer.append_points(points, *replace, *min, *max),
        }
    }
}

impl Drop for StreamPlot {
    fn drop(&mut self) {
        for (buffer, id) in &self.subscriptions {
            buffer.unsubscribe(*id);
        }
    }
}

/// Logical index of the oldest value still held by a snapshot
fn first_index(snapshot: &BufferSnapshot) -> u64 {
    snapshot.total_appended - snapshot.values.len() as u64
}
