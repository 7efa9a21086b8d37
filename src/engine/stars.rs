// Gemstream Engine — Star Effect
//
// A fixed-budget pool of decorative particles. A 16 ms tick creates one star
// while fewer than the cap are live; each star is unmounted exactly `life`
// seconds after it was mounted. Geometry is drawn once, at creation, from the
// container's current size through a seedable RNG.
//
// States per star: Created → Mounted → Removed.

use crate::atoms::constants::{
    MAX_STARS, MAX_STAR_LIFE_SECS, MAX_STAR_SIZE, MIN_STAR_LIFE_SECS, MIN_STAR_SIZE,
    MIN_STAR_TRAVEL_X, MIN_STAR_TRAVEL_Y, STAR_COLOR, STAR_INTERVAL,
};
use crate::atoms::traits::StarStage;
use crate::atoms::types::{Dimensions, Star, StarId};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

// ── Star Field ─────────────────────────────────────────────────────────────

/// Owns the RNG and the live-particle bookkeeping.
pub struct StarField<R = StdRng> {
    rng: R,
    live: usize,
    cap: usize,
    next_id: StarId,
}

impl StarField<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic field for tests and reproducible effects.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for StarField<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> StarField<R> {
    pub fn with_rng(rng: R) -> Self {
        StarField { rng, live: 0, cap: MAX_STARS, next_id: 0 }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Create and count a new star, or `None` when the cap is reached.
    pub fn spawn(&mut self, container: Dimensions) -> Option<Star> {
        if self.live >= self.cap {
            return None;
        }
        self.live += 1;
        Some(self.create(container))
    }

    /// Forget one live star.
    pub fn retire(&mut self) {
        self.live = self.live.saturating_sub(1);
    }

    /// Draw a star's geometry without touching the live count.
    pub fn create(&mut self, container: Dimensions) -> Star {
        let Dimensions { width, height } = container;
        self.next_id += 1;

        let size = random_between(&mut self.rng, MAX_STAR_SIZE, MIN_STAR_SIZE);

        let x = random_between(&mut self.rng, width * 0.75, width * 0.25);
        let y = height / 2.0 - size / 2.0;

        let x_dir = self.random_minus();
        let y_dir = self.random_minus();

        let x_max_travel = (if x_dir < 0.0 { x } else { width - x - size }).max(0.0);
        let y_max_travel = (height / 2.0 - size).max(0.0);

        let x_min_travel = MIN_STAR_TRAVEL_X.min(x_max_travel);
        let y_min_travel = MIN_STAR_TRAVEL_Y.min(y_max_travel);
        let travel_x = random_between(&mut self.rng, x_max_travel, x_min_travel);
        let travel_y = random_between(&mut self.rng, y_max_travel, y_min_travel);

        let life_secs = self.rng.gen_range(MIN_STAR_LIFE_SECS..=MAX_STAR_LIFE_SECS);

        Star {
            id: self.next_id,
            size,
            x,
            y,
            travel_x,
            travel_y,
            x_end: x + travel_x * x_dir,
            y_end: y + travel_y * y_dir,
            life_secs,
            color: STAR_COLOR,
        }
    }

    fn random_minus(&mut self) -> f64 {
        if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 }
    }
}

/// Whole number in `[min, max]`, both ends inclusive. When the range holds
/// no whole number the result is `floor(max)`.
fn random_between<R: Rng>(rng: &mut R, max: f64, min: f64) -> f64 {
    let hi = max.floor() as i64;
    let lo = (min.ceil() as i64).min(hi);
    rng.gen_range(lo..=hi) as f64
}

// ── Driver ─────────────────────────────────────────────────────────────────

/// Timer-driven owner of a `StarField`. Runs until its task is dropped.
pub struct StarEffect<R = StdRng> {
    field: StarField<R>,
    interval: Duration,
}

impl<R: Rng + Send> StarEffect<R> {
    pub fn new(field: StarField<R>) -> Self {
        StarEffect { field, interval: STAR_INTERVAL }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Tick forever: mount a star per tick under the cap, unmount each one
    /// when its life elapses. Ticks with an empty container create nothing.
    pub async fn run<S: StarStage + ?Sized>(
        mut self,
        stage: &S,
        container: watch::Receiver<Dimensions>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut removals: JoinSet<StarId> = JoinSet::new();

        debug!("[stars] Effect started (cap {}, tick {:?})", self.field.cap(), self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dims = *container.borrow();
                    if dims.has_area() {
                        if let Some(star) = self.field.spawn(dims) {
                            stage.mount(&star);
                            let (id, life) = (star.id, star.life());
                            removals.spawn(async move {
                                tokio::time::sleep(life).await;
                                id
                            });
                        }
                    }
                }
                Some(done) = removals.join_next() => {
                    self.field.retire();
                    match done {
                        Ok(id) => stage.unmount(id),
                        Err(e) => warn!("[stars] Removal timer failed: {}", e),
                    }
                }
            }
        }
    }
}
