//! Capabilities shared by the simulated entities.

use crate::math::Point3d;

/// Something with a location in world space.
pub trait Positioned {
    /// The world space location of the entity.
    fn location(&self) -> Point3d;
}

/// Something whose internal timers advance with simulation time.
pub trait Updatable {
    /// Advances the entity by `delta_ms` milliseconds.
    fn update(&mut self, delta_ms: f64);
}

/// Something that can be discarded once it has served its purpose.
pub trait Disposable {
    /// Whether the entity should be removed at simulation time `now_ms`.
    fn is_disposable(&self, now_ms: f64) -> bool;
}
