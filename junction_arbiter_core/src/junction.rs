//! Route input, as supplied by the route-fetching collaborator.
//!
//! The pipeline never mutates a `Junction`; it clones what it needs into
//! events and results.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnDirection {
    Left,
    Right,
    #[default]
    Straight,
    SlightLeft,
    SlightRight,
    SharpLeft,
    SharpRight,
    UTurn,
    Merge,
    Ramp,
    Fork,
    Roundabout,
    Destination,
}

/// One routing waypoint with a required turn/instruction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Junction {
    pub junction_id: u32,
    /// e.g. "Main St & 5th Ave"
    pub address: String,
    pub street_name: String,
    pub coordinates: Coordinates,
    pub turn_direction: TurnDirection,
    pub instruction: String,

    pub distance_to_next_meters: u32,
    pub duration_to_next_seconds: u32,
    pub cumulative_distance_meters: u64,
    pub cumulative_duration_seconds: u64,

    pub maneuver: Option<String>,
    pub neighborhood: Option<String>,
    pub landmarks_nearby: Vec<String>,
}

impl Junction {
    pub fn new(junction_id: u32, address: impl Into<String>) -> Self {
        Self {
            junction_id,
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_turn(mut self, turn: TurnDirection, instruction: impl Into<String>) -> Self {
        self.turn_direction = turn;
        self.instruction = instruction.into();
        self
    }

    pub fn with_street(mut self, street_name: impl Into<String>) -> Self {
        self.street_name = street_name.into();
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.coordinates = Coordinates { latitude, longitude };
        self
    }

    pub fn with_leg(mut self, distance_to_next_meters: u32, duration_to_next_seconds: u32) -> Self {
        self.distance_to_next_meters = distance_to_next_meters;
        self.duration_to_next_seconds = duration_to_next_seconds;
        self
    }

    pub fn with_cumulative(mut self, distance_meters: u64, duration_seconds: u64) -> Self {
        self.cumulative_distance_meters = distance_meters;
        self.cumulative_duration_seconds = duration_seconds;
        self
    }
}

/// Ordered junction list with endpoints and totals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub source_address: String,
    pub destination_address: String,
    pub total_distance_meters: u64,
    pub total_duration_seconds: u64,
    pub junctions: Vec<Junction>,
    pub warnings: Vec<String>,
}

impl Route {
    /// Builds a route and fills the totals from the last junction's leg.
    pub fn new(
        source_address: impl Into<String>,
        destination_address: impl Into<String>,
        junctions: Vec<Junction>,
    ) -> Self {
        let (total_distance_meters, total_duration_seconds) = junctions
            .last()
            .map(|j| {
                (
                    j.cumulative_distance_meters + u64::from(j.distance_to_next_meters),
                    j.cumulative_duration_seconds + u64::from(j.duration_to_next_seconds),
                )
            })
            .unwrap_or((0, 0));

        Self {
            source_address: source_address.into(),
            destination_address: destination_address.into(),
            total_distance_meters,
            total_duration_seconds,
            junctions,
            warnings: Vec::new(),
        }
    }

    #[inline]
    pub fn junction_count(&self) -> usize {
        self.junctions.len()
    }
}
