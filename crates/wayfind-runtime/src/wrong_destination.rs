//! [`WrongDestinationDetector`] – one error per trip for heading to the wrong area.
//!
//! While a trip is active, the agent coming within the detection radius of a
//! catalog destination other than the intended one counts as a single route
//! error.  The detector latches after the first hit and only re-arms when a
//! new trip starts.

use tracing::info;
use wayfind_types::{Destination, Vec3};

/// Default 3-D detection radius around each catalog destination, in metres.
pub const DEFAULT_RADIUS: f32 = 4.0;

#[derive(Debug, Clone)]
pub struct WrongDestinationDetector {
    radius: f32,
    latched: bool,
}

impl Default for WrongDestinationDetector {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS)
    }
}

impl WrongDestinationDetector {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            latched: false,
        }
    }

    /// Re-arm for a new trip.
    pub fn reset(&mut self) {
        self.latched = false;
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Name of the wrong destination the agent has just reached, if this is
    /// the first such visit of the trip.
    pub fn check(&mut self, intended: &str, position: Vec3, catalog: &[Destination]) -> Option<String> {
        if self.latched {
            return None;
        }
        let nearby = catalog
            .iter()
            .filter(|d| d.name != intended)
            .find(|d| position.distance(d.position) < self.radius)?;
        self.latched = true;
        info!(intended, nearby = %nearby.name, "agent reached the wrong destination");
        Some(nearby.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Destination> {
        vec![
            Destination::new("Recepcion", Vec3::new(20.0, 0.0, 10.0)),
            Destination::new("Oficinas", Vec3::new(0.0, 0.0, 10.0)),
        ]
    }

    #[test]
    fn intended_destination_is_never_an_error() {
        let mut detector = WrongDestinationDetector::default();
        assert!(detector.check("Recepcion", Vec3::new(20.0, 0.0, 10.0), &catalog()).is_none());
        assert!(!detector.is_latched());
    }

    #[test]
    fn latches_once_until_reset() {
        let mut detector = WrongDestinationDetector::default();
        let near_offices = Vec3::new(1.0, 0.0, 9.0);
        assert_eq!(
            detector.check("Recepcion", near_offices, &catalog()).as_deref(),
            Some("Oficinas")
        );
        assert!(detector.check("Recepcion", near_offices, &catalog()).is_none());

        detector.reset();
        assert!(detector.check("Recepcion", near_offices, &catalog()).is_some());
    }

    #[test]
    fn radius_is_three_dimensional() {
        let mut detector = WrongDestinationDetector::default();
        // 3 m planar, 3 m vertical: 4.24 m away.
        let above = Vec3::new(3.0, 3.0, 10.0);
        assert!(detector.check("Recepcion", above, &catalog()).is_none());
    }
}
