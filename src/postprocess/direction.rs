// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::context::Context;
use super::PostprocessError;
use crate::route::{Description, DirectionDescription, RouteDescription};
use crate::{bearing_final, bearing_initial, normalize_relative_angle};

/// Turns with an absolute angle in this range (degrees) may continue into a curve.
const CURVE_MIN_INITIAL_ANGLE: f64 = 5.0;
const CURVE_MAX_INITIAL_ANGLE: f64 = 10.0;

/// Maximum distance (km) between consecutive nodes of a curve.
const CURVE_MAX_NODE_DISTANCE: f64 = 0.020;

/// Maximum length (km) of a curve, measured from the turning node.
const CURVE_MAX_DISTANCE: f64 = 0.300;

/// Minimum further bend (degrees) of a node to be fused into a curve.
const CURVE_MIN_ANGLE: f64 = 5.0;

/// Attaches a [DirectionDescription] to every node with a node before it
/// and a node after it which the route leaves from.
///
/// A small initial turn followed by closely spaced nodes bending further
/// in the same direction is reported as one curve, whose angle spans the
/// whole bend. Relies on distances set by [super::Pass::DistanceAndTime].
pub(super) fn direction(ctx: &Context<'_>, description: &mut RouteDescription) -> Result<(), PostprocessError> {
    let nodes = &description.nodes;
    let mut directions = Vec::new();

    for i in 1..nodes.len().saturating_sub(1) {
        ctx.poll()?;
        let (prev, node, next) = (&nodes[i - 1], &nodes[i], &nodes[i + 1]);
        if next.path_object.is_none() {
            continue;
        }

        let in_bearing = bearing_final(prev.location, node.location);
        let out_bearing = bearing_initial(node.location, next.location);
        let turn = normalize_relative_angle(out_bearing - in_bearing);
        let mut curve = turn;

        if (CURVE_MIN_INITIAL_ANGLE..=CURVE_MAX_INITIAL_ANGLE).contains(&turn.abs()) {
            let mut bearing = out_bearing;
            let mut covered = next.distance - node.distance;
            let mut from = i + 1;

            while let Some(lookup) = nodes.get(from + 1).filter(|n| n.path_object.is_some()) {
                let step = lookup.distance - nodes[from].distance;
                if step > CURVE_MAX_NODE_DISTANCE || covered + step > CURVE_MAX_DISTANCE {
                    break;
                }
                covered += step;

                let lookup_bearing = bearing_initial(nodes[from].location, lookup.location);
                let lookup_angle = normalize_relative_angle(lookup_bearing - bearing);
                if lookup_angle.abs() < CURVE_MIN_ANGLE {
                    break;
                }
                // The bend changes its side
                if (turn > 0.0 && lookup_angle <= 0.0) || (turn < 0.0 && lookup_angle >= 0.0) {
                    break;
                }

                bearing = lookup_bearing;
                curve = normalize_relative_angle(bearing - in_bearing);
                from += 1;
            }
        }

        directions.push((i, DirectionDescription::new(turn, curve)));
    }

    for (i, d) in directions {
        description.nodes[i].add_description(Description::Direction(d));
    }
    Ok(())
}
