//! Per-field value and derivative cache.
//!
//! A cache holds the result of the most recent evaluation of one field. It is
//! keyed by location, time and whether derivatives were requested; a request
//! that needs derivatives is only served from an entry that was computed with
//! them.

use super::location::Location;

#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheKey {
    location: Location,
    time: f64,
    derivatives_requested: bool,
}

/// Hit/miss counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FieldCache {
    pub(crate) values: Vec<f64>,
    /// `components x element_dimension`, component-major.
    pub(crate) derivatives: Vec<f64>,
    pub(crate) derivatives_valid: bool,
    pub(crate) element_dimension: usize,
    key: Option<CacheKey>,
    stats: CacheStats,
}

impl FieldCache {
    #[must_use]
    pub fn new(number_of_components: usize) -> Self {
        Self {
            values: vec![0.0; number_of_components],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Derivatives of the last evaluation, if they were produced.
    #[must_use]
    pub fn derivatives(&self) -> Option<&[f64]> {
        self.derivatives_valid.then_some(self.derivatives.as_slice())
    }

    #[must_use]
    pub const fn element_dimension(&self) -> usize {
        self.element_dimension
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.key.is_some()
    }

    /// Whether the cached entry answers this request; counts the outcome.
    pub(crate) fn lookup(&mut self, location: &Location, time: f64, need_derivatives: bool) -> bool {
        let hit = self.holds(location, time, need_derivatives);
        if hit {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        hit
    }

    /// Like [`lookup`](Self::lookup) without touching the counters.
    pub(crate) fn holds(&self, location: &Location, time: f64, need_derivatives: bool) -> bool {
        self.key.as_ref().is_some_and(|key| {
            key.location == *location
                && key.time == time
                && (!need_derivatives || key.derivatives_requested)
        })
    }

    /// Resets the buffers before a compute step writes into them.
    pub(crate) fn prepare(
        &mut self,
        number_of_components: usize,
        element_dimension: usize,
        need_derivatives: bool,
    ) {
        self.key = None;
        self.values.clear();
        self.values.resize(number_of_components, 0.0);
        self.element_dimension = element_dimension;
        self.derivatives.clear();
        if need_derivatives {
            self.derivatives
                .resize(number_of_components * element_dimension, 0.0);
        }
        self.derivatives_valid = need_derivatives && element_dimension > 0;
    }

    pub(crate) fn mark_valid(&mut self, location: Location, time: f64, need_derivatives: bool) {
        self.key = Some(CacheKey {
            location,
            time,
            derivatives_requested: need_derivatives,
        });
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }
}
