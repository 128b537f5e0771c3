//! Longitudinal motion of a vehicle: lookahead, braking and integration.

/// The speed a stopped vehicle assumes it may creep forward at when
/// sizing its lookahead.
const CREEP_SPEED: f64 = 5.0;

/// The distance ahead a vehicle reasons about: its stopping distance
/// plus the distance covered during its reaction time, plus two car lengths.
///
/// # Parameters
/// * `speed` - The vehicle's speed
/// * `safe_dec` - The deceleration the vehicle can comfortably sustain
/// * `reaction_time` - The vehicle's reaction time in s
/// * `length` - The vehicle's length
/// * `stop_speed` - Speed below which the vehicle counts as stopped
pub fn lookahead_distance(
    speed: f64,
    safe_dec: f64,
    reaction_time: f64,
    length: f64,
    stop_speed: f64,
) -> f64 {
    if speed < stop_speed {
        2.0 * length + reaction_time * CREEP_SPEED
    } else {
        speed * (speed / safe_dec + reaction_time) + 2.0 * length
    }
}

/// The distance needed to come to a stop from `speed`.
pub fn stopping_distance(speed: f64, safe_dec: f64) -> f64 {
    speed * speed / (2.0 * safe_dec)
}

/// The deceleration needed to slow from `speed` to `target` within `distance`,
/// clamped to `[min_dec, max_dec]`.
pub fn braking_rate(speed: f64, target: f64, distance: f64, min_dec: f64, max_dec: f64) -> f64 {
    if speed <= target {
        return min_dec;
    }
    if !(distance > 0.0) {
        return max_dec;
    }
    let required = (speed * speed - target * target) / (2.0 * distance);
    required.clamp(min_dec, max_dec)
}

/// Moves the speed towards `target`, accelerating at `acc` or braking at `dec`.
///
/// # Returns
/// The new speed, and the distance travelled during the step.
pub fn integrate(speed: f64, target: f64, acc: f64, dec: f64, dt: f64) -> (f64, f64) {
    let new_speed = if speed < target {
        f64::min(speed + acc * dt, target)
    } else {
        f64::max(speed - dec * dt, target)
    };
    let new_speed = f64::max(new_speed, 0.0);
    (new_speed, 0.5 * (speed + new_speed) * dt)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng};

    #[test]
    fn lookahead_covers_stopping_distance() {
        let mut rng = rand::rngs::StdRng::from_seed(*b"Vegemite sandwhich is not fun...");
        for _ in 0..1000 {
            let speed = rng.gen_range(0.0..200.0);
            let dec = rng.gen_range(0.5..10.0);
            let reaction = rng.gen_range(0.0..2.0);
            let length = rng.gen_range(1.0..20.0);
            let lookahead = lookahead_distance(speed, dec, reaction, length, 0.1);
            assert!(lookahead >= 2.0 * length);
            assert!(lookahead >= stopping_distance(speed, dec));
        }
    }

    #[test]
    fn lookahead_formula() {
        assert_approx_eq!(lookahead_distance(20.0, 8.0, 0.5, 4.5, 0.1), 69.0);
        assert_approx_eq!(lookahead_distance(0.0, 8.0, 0.5, 4.5, 0.1), 11.5);
    }

    #[test]
    fn braking() {
        // 20 -> 0 over 50 units needs 4 units/s^2
        assert_approx_eq!(braking_rate(20.0, 0.0, 50.0, 1.0, 10.0), 4.0);
        assert_approx_eq!(braking_rate(20.0, 0.0, 5.0, 1.0, 10.0), 10.0);
        assert_approx_eq!(braking_rate(20.0, 0.0, 5000.0, 1.0, 10.0), 1.0);
        assert_approx_eq!(braking_rate(20.0, 0.0, 0.0, 1.0, 10.0), 10.0);
        assert_approx_eq!(braking_rate(5.0, 10.0, 1.0, 1.0, 10.0), 1.0);
    }

    #[test]
    fn constant_braking_stops_at_the_line() {
        let (mut speed, mut travelled) = (20.0, 0.0);
        let rate = braking_rate(speed, 0.0, 50.0, 1.0, 10.0);
        while speed > 0.0 {
            let (v, d) = integrate(speed, 0.0, 2.0, rate, 0.05);
            speed = v;
            travelled += d;
        }
        assert_approx_eq!(travelled, 50.0, 0.01);
    }

    #[test]
    fn acceleration_is_capped_at_target() {
        let (speed, travelled) = integrate(9.0, 10.0, 4.0, 6.0, 1.0);
        assert_approx_eq!(speed, 10.0);
        assert_approx_eq!(travelled, 9.5);
    }
}
