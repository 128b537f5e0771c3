use crate::network::RoadNetwork;
use log::warn;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

/// The default maximum time step of a real time clock, in ms.
const DEFAULT_MAX_STEP_MS: f64 = 200.0;

/// A traffic simulation: a road network, its clock and its random number generator.
pub struct Simulation {
    network: RoadNetwork,
    context: TickContext,
    clock: Clock,
    /// The number of ticks simulated so far.
    frame: usize,
}

/// How [Simulation::tick] measures elapsed time.
#[derive(Clone, Copy, Debug)]
pub enum Clock {
    /// Every tick advances by the same amount of simulation time.
    Fixed { step_ms: f64 },
    /// Every tick advances by the wall clock time since the previous tick,
    /// capped at `max_step_ms`.
    RealTime {
        last: Option<Instant>,
        max_step_ms: f64,
    },
}

/// The state shared by every entity during a tick.
///
/// Holds the simulation time and the seeded random number generator, so
/// that a simulation replays identically from the same seed.
#[derive(Clone, Debug)]
pub struct TickContext {
    now_ms: f64,
    rng: StdRng,
}

impl Clock {
    /// A wall clock with the default maximum step.
    pub fn real_time() -> Self {
        Clock::RealTime {
            last: None,
            max_step_ms: DEFAULT_MAX_STEP_MS,
        }
    }

    /// The time to advance by for the next tick, in ms.
    fn next_delta(&mut self) -> f64 {
        match self {
            Clock::Fixed { step_ms } => *step_ms,
            Clock::RealTime { last, max_step_ms } => {
                let now = Instant::now();
                let delta = last
                    .replace(now)
                    .map_or(0.0, |last| 1000.0 * (now - last).as_secs_f64());
                f64::min(delta, *max_step_ms)
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::Fixed { step_ms: 50.0 }
    }
}

impl TickContext {
    /// Creates a context at time zero with a generator seeded from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            now_ms: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The simulation time at the end of the current tick, in ms.
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub(crate) fn advance(&mut self, delta_ms: f64) {
        self.now_ms += delta_ms;
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

impl Simulation {
    /// Creates a simulation of `network` with a fixed 50 ms clock.
    pub fn new(network: RoadNetwork, seed: u64) -> Self {
        Self {
            network,
            context: TickContext::new(seed),
            clock: Clock::default(),
            frame: 0,
        }
    }

    /// Replaces the clock used by [Simulation::tick].
    pub fn with_clock(self, clock: Clock) -> Self {
        Self { clock, ..self }
    }

    /// Advances the simulation by `delta_ms` milliseconds.
    ///
    /// For a realistic simulation, do not use a time step greater than around 200 ms.
    pub fn step(&mut self, delta_ms: f64) {
        self.network.update(delta_ms, &mut self.context);
        self.frame += 1;
    }

    /// Advances the simulation by the time given by its clock.
    pub fn tick(&mut self) {
        let delta = self.clock.next_delta();
        self.step(delta);
    }

    /// Advances the simulation by `duration_ms`, in steps of at most `step_ms`.
    pub fn run_for(&mut self, duration_ms: f64, step_ms: f64) {
        if !(step_ms > 0.0) || !duration_ms.is_finite() {
            warn!(
                "cannot run for {} ms in steps of {} ms",
                duration_ms, step_ms
            );
            return;
        }
        let mut remaining = duration_ms;
        while remaining > 0.0 {
            let delta = f64::min(step_ms, remaining);
            self.step(delta);
            remaining -= delta;
        }
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut RoadNetwork {
        &mut self.network
    }

    /// The current simulation time in ms.
    pub fn now_ms(&self) -> f64 {
        self.context.now_ms()
    }

    /// Gets the number of ticks simulated so far.
    pub fn frame(&self) -> usize {
        self.frame
    }
}
