//! Zone membership evaluation.
//!
//! [`evaluate`] is a pure function over one sample and one snapshot of the
//! zone catalog. It performs no I/O and keeps no state between calls, so any
//! number of subjects can be evaluated concurrently.

use crate::model::{LocationSample, Violation, Zone};

/// Return one [`Violation`] per active zone that contains the sample.
///
/// A zone contains the sample when the great-circle distance to its center
/// is at most `radius_meters`; a sample exactly on the boundary is inside.
/// Violations come back in the same order as `zones`.
///
/// Degenerate zones are not rejected. A zero radius matches only a sample at
/// the exact center and a negative radius never matches. Non-finite
/// coordinates never match because every comparison against `NaN` is false.
pub fn evaluate(sample: &LocationSample, zones: &[Zone]) -> Vec<Violation> {
    let point = sample.point();

    zones
        .iter()
        .filter(|zone| zone.is_active)
        .filter_map(|zone| {
            let distance = point.distance_to(&zone.center());
            (distance <= zone.radius_meters).then(|| Violation {
                zone_id: zone.id,
                zone_name: zone.name.clone(),
                zone_type: zone.zone_type.clone(),
                distance_meters: distance.round() as i64,
                description: zone.description.clone(),
            })
        })
        .collect()
}
