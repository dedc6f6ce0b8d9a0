// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashSet;

use super::context::Context;
use super::PostprocessError;
use crate::database::RoutableObject;
use crate::graph::ObjectFileRef;
use crate::route::{DatabaseId, Description, NameDescription, Node, RouteDescription};
use crate::TypeId;

/// Road types treated as motorways and motorway links by [super::Pass::Instruction].
/// Types missing from a database are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionConfig {
    pub motorway_types: HashSet<String>,
    pub motorway_link_types: HashSet<String>,
}

impl Default for InstructionConfig {
    fn default() -> Self {
        Self {
            motorway_types: ["highway_motorway", "highway_motorway_trunk", "highway_motorway_primary"]
                .into_iter()
                .map(String::from)
                .collect(),
            motorway_link_types: ["highway_motorway_link", "highway_trunk_link"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Kind of road the route is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Street,
    Roundabout,
    Motorway,
    Link,
}

/// [InstructionConfig] resolved into type ids, per database.
struct Classifier {
    motorway: Vec<HashSet<TypeId>>,
    link: Vec<HashSet<TypeId>>,
}

impl Classifier {
    fn new(ctx: &Context<'_>, config: &InstructionConfig) -> Result<Self, PostprocessError> {
        let mut motorway = Vec::with_capacity(ctx.database_count());
        let mut link = Vec::with_capacity(ctx.database_count());
        for i in 0..ctx.database_count() {
            let types = ctx.types(DatabaseId(i as u32))?;
            let resolve = |names: &HashSet<String>| -> HashSet<TypeId> {
                names.iter().filter_map(|n| types.by_name(n)).map(|t| t.id).collect()
            };
            motorway.push(resolve(&config.motorway_types));
            link.push(resolve(&config.motorway_link_types));
        }
        Ok(Self { motorway, link })
    }

    fn state(&self, ctx: &Context<'_>, node: &Node) -> Result<State, PostprocessError> {
        let Some(object) = ctx.path_object(node)? else {
            return Ok(State::Street);
        };
        let is = |sets: &[HashSet<TypeId>]| {
            sets.get(node.database.index())
                .is_some_and(|s| s.contains(&object.type_id()))
        };

        Ok(if object.is_roundabout() {
            State::Roundabout
        } else if is(&self.link) {
            State::Link
        } else if is(&self.motorway) {
            State::Motorway
        } else {
            State::Street
        })
    }
}

/// Roundabout the route is currently on.
#[derive(Debug, Clone, Copy, Default)]
struct Roundabout {
    clockwise: bool,
    exits: usize,
}

impl Roundabout {
    /// Counts the exits passed at `node`, the way the route came in excluded.
    fn pass(&mut self, node: &Node) {
        if let Some(c) = node.crossing_ways() {
            self.exits += c.exit_count.saturating_sub(1);
        }
    }
}

/// Walks the route as a state machine over [State], emitting roundabout,
/// motorway, turn and name change descriptions on transitions.
pub(super) fn instructions(
    ctx: &Context<'_>,
    description: &mut RouteDescription,
    config: &InstructionConfig,
) -> Result<(), PostprocessError> {
    let classifier = Classifier::new(ctx, config)?;
    let Some(first) = description.nodes.first() else {
        return Ok(());
    };

    let mut state = classifier.state(ctx, first)?;
    let mut roundabout = Roundabout::default();

    for i in 1..description.len() {
        ctx.poll()?;
        let nodes = &description.nodes;
        let (last, node) = (&nodes[i - 1], &nodes[i]);
        if last.path_object.is_none() || node.path_object.is_none() {
            continue;
        }

        let current = classifier.state(ctx, node)?;
        let mut emitted = Vec::new();

        match (state, current) {
            (s, State::Roundabout) if s != State::Roundabout => {
                roundabout = Roundabout {
                    clockwise: matches!(ctx.path_object(node)?, Some(RoutableObject::Way(w)) if w.is_clockwise()),
                    exits: 0,
                };
                emitted.push(Description::RoundaboutEnter {
                    clockwise: roundabout.clockwise,
                });
            }

            (State::Roundabout, c) if c != State::Roundabout => {
                roundabout.pass(node);
                emitted.push(Description::RoundaboutLeave {
                    exit_count: roundabout.exits,
                    clockwise: roundabout.clockwise,
                });
            }

            (State::Street, State::Motorway) => {
                emitted.push(Description::MotorwayEnter {
                    to: node.name().cloned(),
                });
            }

            (State::Motorway, State::Street) => {
                emitted.push(Description::MotorwayLeave {
                    from: last.name().cloned().unwrap_or_default(),
                });
            }

            (s, State::Link) if s != State::Link => {
                emitted.extend(motorway_link(ctx, &classifier, nodes, i, s == State::Motorway)?);
            }

            (State::Roundabout, State::Roundabout) => {
                roundabout.pass(node);
                emitted.extend(name_change(last, node));
            }

            _ => {
                if needs_turn(ctx, nodes, i)? {
                    emitted.push(Description::Turn);
                } else {
                    emitted.extend(name_change(last, node));
                }
            }
        }

        state = current;
        for d in emitted {
            description.nodes[i].add_description(d);
        }
    }
    Ok(())
}

/// Resolves a motorway link starting at node `i` by looking at the
/// road after the chain of links.
fn motorway_link(
    ctx: &Context<'_>,
    classifier: &Classifier,
    nodes: &[Node],
    i: usize,
    from_motorway: bool,
) -> Result<Vec<Description>, PostprocessError> {
    let mut next = i + 1;
    let mut next_name = None;
    while let Some(n) = nodes.get(next).filter(|n| n.path_object.is_some()) {
        next_name = n.name().cloned();
        if classifier.state(ctx, n)? != State::Link {
            break;
        }
        next += 1;
    }

    let to_motorway = match nodes.get(next) {
        Some(n) => classifier.state(ctx, n)? == State::Motorway,
        None => false,
    };
    let from_name = || nodes[i - 1].name().cloned().unwrap_or_default();

    Ok(match (from_motorway, to_motorway) {
        (true, true) => vec![Description::MotorwayChange {
            from: from_name(),
            to: next_name.unwrap_or_default(),
        }],
        (true, false) => vec![Description::MotorwayLeave { from: from_name() }],
        (false, true) => {
            let mut d = Vec::new();
            if needs_turn(ctx, nodes, i)? {
                d.push(Description::Turn);
            }
            d.push(Description::MotorwayEnter { to: next_name });
            d
        }
        (false, false) => Vec::new(),
    })
}

/// Checks if node `i` needs an explicit turn: its curve is not straight,
/// it has another usable exit and the road name changes (or stays, but
/// the curve is more than slight).
fn needs_turn(ctx: &Context<'_>, nodes: &[Node], i: usize) -> Result<bool, PostprocessError> {
    let (last, node) = (&nodes[i - 1], &nodes[i]);
    if node.objects.len() <= 1 {
        return Ok(false);
    }
    let Some(direction) = node.direction() else {
        return Ok(false);
    };
    if direction.curve.is_straight() {
        return Ok(false);
    }

    if last.database == node.database {
        let is_incoming = |(object, index): &(ObjectFileRef, usize)| {
            Some(*object) == last.path_object && *index == last.current_node_index
        };
        let is_outgoing = |(object, index): &(ObjectFileRef, usize)| {
            Some(*object) == node.path_object && *index == node.target_node_index
        };
        let has_other_exit = node_exits(ctx, node)?
            .iter()
            .any(|exit| !is_incoming(exit) && !is_outgoing(exit));
        if !has_other_exit {
            return Ok(false);
        }
    }

    Ok(match (last.name(), node.name()) {
        (Some(from), Some(to)) if from == to => !direction.curve.is_slight(),
        _ => true,
    })
}

/// Usable ways out of a junction, as (way, index of the neighbor node) pairs.
/// Only computed when the route continues on a way.
fn node_exits(ctx: &Context<'_>, node: &Node) -> Result<Vec<(ObjectFileRef, usize)>, PostprocessError> {
    let mut exits = Vec::new();
    if !matches!(ctx.path_object(node)?, Some(RoutableObject::Way(_))) {
        return Ok(exits);
    }

    for &object in &node.objects {
        let o = ctx.object(node.database, object)?;
        if o.is_area() {
            continue;
        }
        let Some(index) = o.node_index(node.node_id) else {
            continue;
        };

        if index > 0 && ctx.can_use_backward(node.database, node.node_id, object)? {
            exits.push((object, index - 1));
        }
        if index + 1 < o.node_count() && ctx.can_use_forward(node.database, node.node_id, object)? {
            exits.push((object, index + 1));
        }
    }
    Ok(exits)
}

fn name_change(last: &Node, node: &Node) -> Option<Description> {
    name_changed(last.name()?, node.name()?)
}

/// Returns a [Description::NameChanged], unless the change is not worth
/// mentioning: only one of the names is empty and the references match,
/// or only the reference changes.
pub(super) fn name_changed(from: &NameDescription, to: &NameDescription) -> Option<Description> {
    if from == to {
        return None;
    }
    if from.has_name() != to.has_name() && from.reference == to.reference {
        return None;
    }
    if from.has_name() && from.name == to.name {
        return None;
    }
    Some(Description::NameChanged {
        from: from.clone(),
        to: to.clone(),
    })
}
