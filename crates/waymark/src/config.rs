use rand::Rng;

/// Parameters of the path query service, see [`PathQuery`](crate::PathQuery).
///
/// Units are world units (wu) unless noted otherwise.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryConfig {
    /// How far a point may be from the centroid of the nearest node and still count as walkable. `[Limit: >= 0] [Units: wu]`
    ///
    /// Points inside a walkable triangle are always walkable, independent of this value.
    pub walkable_tolerance: f32,

    /// Distance kept from the edges of the bounds when clamping query endpoints. `[Limit: >= 0] [Units: wu]`
    ///
    /// Endpoints outside the bounds are clamped into `[min + clamp_margin, max - clamp_margin]`.
    /// Agent positions may drift up to `clamp_margin` outside the bounds before being clamped back.
    pub clamp_margin: f32,

    /// Height of waypoints above the walking surface. `[Units: wu]`
    pub waypoint_elevation: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            walkable_tolerance: 5.0,
            clamp_margin: 2.0,
            waypoint_elevation: 0.5,
        }
    }
}

/// A closed range of seconds from which delays are sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DelayRange {
    /// Shortest delay. `[Units: s]`
    pub min: f32,
    /// Longest delay. `[Units: s]`
    pub max: f32,
}

impl DelayRange {
    /// Creates a new range. The bounds are swapped if given in the wrong order.
    pub fn new(min: f32, max: f32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Samples a delay from the range.
    pub fn sample(&self, rng: &mut impl Rng) -> f32 {
        if self.max <= self.min {
            self.min.max(0.0)
        } else {
            rng.gen_range(self.min..=self.max).max(0.0)
        }
    }
}

/// Parameters of the per-agent steering controller, see [`Agent`](crate::Agent).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SteeringConfig {
    /// Movement speed. `[Limit: >= 0] [Units: wu/s]`
    pub speed: f32,

    /// A waypoint closer than this counts as reached. `[Limit: > 0] [Units: wu]`
    pub reach_threshold: f32,

    /// Fraction of the remaining distance to the current waypoint that may be covered in a single tick. `[Limit: (0, 1]]`
    ///
    /// Prevents overshooting waypoints at low frame rates.
    pub overshoot_cap: f32,

    /// Fraction of the way toward the candidate position taken on clear ground. `[Limit: (0, 1]]`
    pub clear_blend: f32,

    /// Fraction of the way toward the candidate position taken shortly after a blocked move. `[Limit: (0, 1]]`
    pub uncertain_blend: f32,

    /// Number of ticks after a blocked move during which [`SteeringConfig::uncertain_blend`] applies.
    pub uncertain_ticks: u32,

    /// Fraction of the remaining yaw difference turned per tick. `[Limit: (0, 1]]`
    pub turn_rate: f32,

    /// Number of candidate destinations tried before falling back to a nudge.
    pub seek_attempts: u32,

    /// Share of the seek attempts sampled around the current position instead of the whole bounds. `[Limit: [0, 1]]`
    pub local_fraction: f32,

    /// Radius around the current position used for local destination sampling. `[Units: wu]`
    pub local_radius: f32,

    /// Distance moved in a random direction when no destination with a path was found. `[Units: wu]`
    pub nudge_distance: f32,

    /// Delay after which a wandering agent picks a new destination, whether or not it arrived.
    pub reseek_delay: DelayRange,

    /// Delay between completing a path and picking the next destination.
    pub completion_delay: DelayRange,

    /// Consecutive blocked ticks after which the current path is abandoned.
    pub max_blocked_ticks: u32,

    /// Whether a blocked agent asks for a new path to its final waypoint.
    pub replan_on_block: bool,

    /// Number of random points tried when spawning an agent at a random walkable position.
    pub spawn_attempts: u32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            speed: 1.4,
            reach_threshold: 0.1,
            overshoot_cap: 0.8,
            clear_blend: 1.0,
            uncertain_blend: 0.4,
            uncertain_ticks: 10,
            turn_rate: 0.1,
            seek_attempts: 15,
            local_fraction: 0.75,
            local_radius: 20.0,
            nudge_distance: 1.0,
            reseek_delay: DelayRange::new(2.0, 5.0),
            completion_delay: DelayRange::new(1.0, 3.0),
            max_blocked_ticks: 60,
            replan_on_block: true,
            spawn_attempts: 50,
        }
    }
}

/// Parameters of a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    /// Seed of the simulation's random number generator. Every agent derives its own seed from it.
    pub seed: u64,

    /// Upper bound of the random delay before an agent starts moving after [`Simulation::start_all`](crate::Simulation::start_all). `[Units: s]`
    pub start_delay_max: f32,

    /// Whether [`Simulation::debug_overlay`](crate::Simulation::debug_overlay) produces data.
    pub debug: bool,

    /// Path query parameters.
    pub query: QueryConfig,

    /// Default steering parameters for spawned agents.
    pub steering: SteeringConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            start_delay_max: 1.0,
            debug: false,
            query: QueryConfig::default(),
            steering: SteeringConfig::default(),
        }
    }
}
