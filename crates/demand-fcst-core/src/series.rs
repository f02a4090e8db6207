//! Per-entity time series construction.
//!
//! Rows are grouped by entity id, dates are aligned to the configured
//! granularity, and rows falling in the same period are summed. Entities
//! with too few distinct periods are set aside as insufficient history
//! instead of failing the batch.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::period::Granularity;
use crate::schema::CanonicalRow;

/// A forecastable item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Entity {
    /// Stable key.
    pub id: String,
    /// Display name (first one seen in the batch).
    pub name: String,
    /// Group the entity is rolled up into (first one seen in the batch).
    pub group_id: String,
}

/// One aggregated period of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    /// Period start date.
    pub period: NaiveDate,
    pub quantity: f64,
}

/// Chronologically ordered, duplicate-free series of period totals.
///
/// Constructed only through [`TimeSeries::from_points`], which enforces the
/// ordering and merge rules; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    granularity: Granularity,
    observations: Vec<Observation>,
}

impl TimeSeries {
    /// Build a series from raw `(date, quantity)` points.
    ///
    /// Dates are aligned to `granularity`; points in the same period are
    /// summed; the result is sorted ascending.
    pub fn from_points<I>(granularity: Granularity, points: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (date, qty) in points {
            *totals.entry(granularity.align(date)).or_insert(0.0) += qty;
        }
        let observations = totals
            .into_iter()
            .map(|(period, quantity)| Observation { period, quantity })
            .collect();
        Self {
            granularity,
            observations,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.quantity).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_period(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.period)
    }

    pub fn last_period(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.period)
    }

    /// The last `n` observations (all of them if the series is shorter).
    pub fn tail(&self, n: usize) -> &[Observation] {
        let start = self.observations.len().saturating_sub(n);
        &self.observations[start..]
    }

    /// Copy of this series with zero-quantity periods inserted for every
    /// period missing between the first and last observation.
    pub fn with_gaps_filled(&self) -> TimeSeries {
        let (Some(first), Some(last)) = (self.first_period(), self.last_period()) else {
            return self.clone();
        };
        let mut filled = Vec::with_capacity(self.observations.len());
        let mut existing = self.observations.iter().peekable();
        let mut cursor = first;
        while cursor <= last {
            match existing.peek() {
                Some(obs) if obs.period == cursor => {
                    filled.push(**obs);
                    existing.next();
                }
                _ => filled.push(Observation {
                    period: cursor,
                    quantity: 0.0,
                }),
            }
            let next = self.granularity.advance(cursor, 1);
            if next <= cursor {
                break;
            }
            cursor = next;
        }
        TimeSeries {
            granularity: self.granularity,
            observations: filled,
        }
    }
}

/// An entity together with its series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySeries {
    pub entity: Entity,
    pub series: TimeSeries,
}

/// An entity excluded from forecasting for lack of history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsufficientHistory {
    pub entity: Entity,
    /// Distinct periods observed.
    pub periods: usize,
    /// Minimum periods required.
    pub required: usize,
}

/// Output of [`SeriesBuilder::build`], in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    pub series: Vec<EntitySeries>,
    pub insufficient: Vec<InsufficientHistory>,
    /// Every entity in either category, in order of first appearance.
    pub order: Vec<Entity>,
}

impl SeriesSet {
    /// Every entity seen, eligible or not, in order of first appearance
    /// across both categories.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter()
    }
}

/// Groups canonical rows into per-entity series.
#[derive(Debug, Clone)]
pub struct SeriesBuilder {
    granularity: Granularity,
    min_history: usize,
    fill_gaps: bool,
}

impl Default for SeriesBuilder {
    fn default() -> Self {
        Self {
            granularity: Granularity::Month,
            min_history: 2,
            fill_gaps: false,
        }
    }
}

impl SeriesBuilder {
    pub fn new(granularity: Granularity, min_history: usize) -> Result<Self> {
        if min_history == 0 {
            return Err(PipelineError::invalid_parameter(
                "min_history",
                min_history,
                "must be at least 1",
            ));
        }
        Ok(Self {
            granularity,
            min_history,
            fill_gaps: false,
        })
    }

    /// Insert zero periods between an entity's first and last observation.
    pub fn fill_gaps(mut self, fill: bool) -> Self {
        self.fill_gaps = fill;
        self
    }

    /// Build one series per entity id.
    ///
    /// Entities whose number of distinct observed periods is below
    /// `min_history` go to [`SeriesSet::insufficient`].
    pub fn build(&self, rows: &[CanonicalRow]) -> SeriesSet {
        let mut order: Vec<Entity> = Vec::new();
        let mut points: HashMap<&str, Vec<(NaiveDate, f64)>> = HashMap::new();

        for row in rows {
            let entry = points.entry(row.entity_id.as_str()).or_insert_with(|| {
                order.push(Entity {
                    id: row.entity_id.clone(),
                    name: row.entity_name.clone(),
                    group_id: row.group_id.clone(),
                });
                Vec::new()
            });
            entry.push((row.date, row.quantity));
        }

        let mut set = SeriesSet {
            order: order.clone(),
            ..Default::default()
        };
        for entity in order {
            let raw = points.remove(entity.id.as_str()).unwrap_or_default();
            let series = TimeSeries::from_points(self.granularity, raw);
            let observed = series.len();

            if observed < self.min_history {
                debug!(entity = %entity.id, periods = observed, required = self.min_history, "insufficient history");
                set.insufficient.push(InsufficientHistory {
                    entity,
                    periods: observed,
                    required: self.min_history,
                });
                continue;
            }

            let series = if self.fill_gaps {
                series.with_gaps_filled()
            } else {
                series
            };
            set.series.push(EntitySeries { entity, series });
        }
        set
    }
}
