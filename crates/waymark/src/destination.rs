//! Autonomous destination selection.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::Rng;

use crate::{NavPath, PathQuery, SteeringConfig};

/// The result of a destination search.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// A candidate with a route through the navigation graph was found.
    Path(NavPath),
    /// No candidate had a route. The agent should step toward this point without a path check.
    Nudge(Vec3),
}

/// Picks a destination for an agent standing at `position`.
///
/// The first [`SteeringConfig::local_fraction`] of the [`SteeringConfig::seek_attempts`] sample
/// around the agent, the remaining ones sample the whole bounds. The first candidate with a
/// non-fallback path wins. If every attempt fails, a [`Destination::Nudge`] is returned.
pub fn choose_destination(
    query: &PathQuery,
    position: Vec3,
    config: &SteeringConfig,
    rng: &mut impl Rng,
) -> Destination {
    let local_attempts = (config.seek_attempts as f32 * config.local_fraction.clamp(0.0, 1.0))
        .round() as u32;
    for attempt in 0..config.seek_attempts {
        let candidate = match query.bounds() {
            Some(bounds) if attempt >= local_attempts => Vec3::new(
                rng.gen_range(bounds.min.x..=bounds.max.x),
                position.y,
                rng.gen_range(bounds.min.z..=bounds.max.z),
            ),
            _ => {
                let distance = rng.gen_range(0.0..=config.local_radius.max(0.0));
                position + random_direction(rng) * distance
            }
        };
        if !query.is_point_walkable(candidate) {
            continue;
        }
        let path = query.find_path(position, candidate);
        if !path.is_fallback() && !path.is_empty() {
            return Destination::Path(path);
        }
    }

    let margin = query.config().clamp_margin;
    let target = position + random_direction(rng) * config.nudge_distance;
    Destination::Nudge(query.elevate(query.clamp_to_bounds(target, -margin)))
}

/// A random unit vector on the xz-plane.
pub(crate) fn random_direction(rng: &mut impl Rng) -> Vec3 {
    let angle = rng.gen_range(0.0..TAU);
    Vec3::new(angle.sin(), 0.0, angle.cos())
}
