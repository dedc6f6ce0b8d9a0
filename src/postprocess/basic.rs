// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::context::Context;
use super::PostprocessError;
use crate::database::RoutableObject;
use crate::earth_distance;
use crate::route::{CrossingWaysDescription, Description, Node, RouteDescription};

pub(super) fn start(description: &mut RouteDescription, label: &str) -> Result<(), PostprocessError> {
    if let Some(first) = description.nodes.first_mut() {
        first.add_description(Description::Start(label.to_string()));
    }
    Ok(())
}

pub(super) fn target(description: &mut RouteDescription, label: &str) -> Result<(), PostprocessError> {
    if let Some(last) = description.nodes.last_mut() {
        last.add_description(Description::Target(label.to_string()));
    }
    Ok(())
}

/// Accumulates distance and time. The segment leading into a node is
/// travelled on the path object of the node before it.
pub(super) fn distance_and_time(ctx: &Context<'_>, description: &mut RouteDescription) -> Result<(), PostprocessError> {
    let mut distance = 0.0;
    let mut time = 0.0;
    let mut previous: Option<&Node> = None;

    let mut totals = Vec::with_capacity(description.len());
    for node in description.iter() {
        ctx.poll()?;
        let location = node.node_id.coord();

        if let Some(prev) = previous {
            if let Some(object) = ctx.path_object(prev)? {
                let delta = earth_distance(prev.node_id.coord(), location);
                distance += delta;
                time += ctx.profile(prev.database)?.time(object, delta);
            }
        }

        totals.push((distance, time, location));
        previous = Some(node);
    }

    for (node, (distance, time, location)) in description.nodes.iter_mut().zip(totals) {
        node.distance = distance;
        node.time = time;
        node.location = location;
    }
    Ok(())
}

/// Names every node by the object the route continues on. Bridges with
/// their own name but the same reference keep the name of the road before them.
pub(super) fn way_name(ctx: &Context<'_>, description: &mut RouteDescription) -> Result<(), PostprocessError> {
    for i in 0..description.len() {
        ctx.poll()?;
        let node = &description.nodes[i];
        let Some(path) = node.path_object else {
            break;
        };

        let mut name = ctx.name(node.database, path)?;
        let is_bridge = ctx.object(node.database, path)?.is_bridge();
        if is_bridge && i > 0 {
            if let Some(last) = description.nodes[i - 1].name() {
                if last.reference == name.reference && last.name != name.name {
                    name = last.clone();
                }
            }
        }

        description.nodes[i].add_description(Description::WayName(name));
    }
    Ok(())
}

pub(super) fn crossing_ways(ctx: &Context<'_>, description: &mut RouteDescription) -> Result<(), PostprocessError> {
    for i in 1..description.len() {
        ctx.poll()?;
        let (last, node) = (&description.nodes[i - 1], &description.nodes[i]);
        if node.objects.is_empty() {
            continue;
        }
        let (Some(last_path), Some(node_path)) = (last.path_object, node.path_object) else {
            continue;
        };

        let last_object = ctx.object(last.database, last_path)?;
        let same_database = last.database == node.database;
        let index_on_last = last.target_node_index;

        let mut exit_count = 0;
        for &object in &node.objects {
            let is_last_path = same_database && object == last_path;

            if ctx.can_use_forward(node.database, node.node_id, object)?
                && !(is_last_path
                    && !last_object.is_roundabout()
                    && leads_forward(last_object, index_on_last, last.current_node_index))
            {
                exit_count += 1;
            }

            if ctx.can_use_backward(node.database, node.node_id, object)?
                && !(is_last_path && leads_backward(last_object, index_on_last, last.current_node_index))
            {
                exit_count += 1;
            }
        }

        let mut crossing = Vec::new();
        for &object in &node.objects {
            let is_origin = same_database && object == last_path;
            let is_target = object == node_path;
            let is_end = ctx.object(node.database, object)?.is_start_or_end(node.node_id);

            // Origin and target ways ending here are not crossing ways
            if ((is_origin || is_target) && is_end) || (is_origin && is_target) {
                continue;
            }
            crossing.push(ctx.name(node.database, object)?);
        }

        let desc = CrossingWaysDescription {
            exit_count,
            origin: Some(ctx.name(last.database, last_path)?),
            target: Some(ctx.name(node.database, node_path)?),
            crossing,
        };
        description.nodes[i].add_description(Description::CrossingWays(desc));
    }
    Ok(())
}

/// Checks if moving from node index `from` to `to` follows the direction of the object.
fn leads_forward(object: &RoutableObject, from: usize, to: usize) -> bool {
    object.is_area() || to > from
}

fn leads_backward(object: &RoutableObject, from: usize, to: usize) -> bool {
    object.is_area() || to < from
}
