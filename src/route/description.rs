// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fmt;

use super::{DatabaseId, RouteData, RouteEntry};
use crate::graph::{NodeId, ObjectFileRef};
use crate::GeoCoord;

/// Display name of a way: its name and its reference (e.g. "A1").
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NameDescription {
    pub name: String,
    pub reference: String,
}

impl NameDescription {
    pub fn new(name: &str, reference: &str) -> Self {
        Self {
            name: name.to_string(),
            reference: reference.to_string(),
        }
    }

    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn has_ref(&self) -> bool {
        !self.reference.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.reference.is_empty()
    }
}

impl fmt::Display for NameDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.has_name(), self.has_ref()) {
            (true, true) => write!(f, "{} ({})", self.name, self.reference),
            (true, false) => f.write_str(&self.name),
            (false, true) => f.write_str(&self.reference),
            (false, false) => f.write_str("unnamed road"),
        }
    }
}

/// Classification of a turn or curve angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    SharpLeft,
    Left,
    SlightlyLeft,
    StraightOn,
    SlightlyRight,
    Right,
    SharpRight,
}

impl Move {
    /// Classifies a relative angle in degrees, negative angles turning left.
    pub fn from_angle(angle: f64) -> Self {
        let abs = angle.abs();
        let left = angle < 0.0;
        if abs <= 10.0 {
            Self::StraightOn
        } else if abs <= 45.0 {
            if left {
                Self::SlightlyLeft
            } else {
                Self::SlightlyRight
            }
        } else if abs <= 120.0 {
            if left {
                Self::Left
            } else {
                Self::Right
            }
        } else if left {
            Self::SharpLeft
        } else {
            Self::SharpRight
        }
    }

    pub fn is_straight(self) -> bool {
        self == Self::StraightOn
    }

    pub fn is_slight(self) -> bool {
        matches!(self, Self::SlightlyLeft | Self::SlightlyRight)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SharpLeft => "sharp left",
            Self::Left => "left",
            Self::SlightlyLeft => "slightly left",
            Self::StraightOn => "straight on",
            Self::SlightlyRight => "slightly right",
            Self::Right => "right",
            Self::SharpRight => "sharp right",
        })
    }
}

/// Geometric turn at a node. `turn` covers only the node itself,
/// `curve` also the small bends fused into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionDescription {
    pub turn_angle: f64,
    pub curve_angle: f64,
    pub turn: Move,
    pub curve: Move,
}

impl DirectionDescription {
    pub fn new(turn_angle: f64, curve_angle: f64) -> Self {
        Self {
            turn_angle,
            curve_angle,
            turn: Move::from_angle(turn_angle),
            curve: Move::from_angle(curve_angle),
        }
    }
}

/// Ways meeting at a junction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossingWaysDescription {
    /// Number of usable exits, not counting the way back.
    pub exit_count: usize,
    pub origin: Option<NameDescription>,
    pub target: Option<NameDescription>,
    pub crossing: Vec<NameDescription>,
}

/// Annotation attached to a [Node] by a post-processing pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Description {
    Start(String),
    Target(String),
    WayName(NameDescription),
    CrossingWays(CrossingWaysDescription),
    Direction(DirectionDescription),
    Turn,
    RoundaboutEnter { clockwise: bool },
    RoundaboutLeave { exit_count: usize, clockwise: bool },
    MotorwayEnter { to: Option<NameDescription> },
    MotorwayChange { from: NameDescription, to: NameDescription },
    MotorwayLeave { from: NameDescription },
    NameChanged { from: NameDescription, to: NameDescription },
}

/// Discriminant of [Description]. A node carries at most one description of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptionKind {
    Start,
    Target,
    WayName,
    CrossingWays,
    Direction,
    Turn,
    RoundaboutEnter,
    RoundaboutLeave,
    MotorwayEnter,
    MotorwayChange,
    MotorwayLeave,
    NameChanged,
}

impl Description {
    pub fn kind(&self) -> DescriptionKind {
        match self {
            Self::Start(_) => DescriptionKind::Start,
            Self::Target(_) => DescriptionKind::Target,
            Self::WayName(_) => DescriptionKind::WayName,
            Self::CrossingWays(_) => DescriptionKind::CrossingWays,
            Self::Direction(_) => DescriptionKind::Direction,
            Self::Turn => DescriptionKind::Turn,
            Self::RoundaboutEnter { .. } => DescriptionKind::RoundaboutEnter,
            Self::RoundaboutLeave { .. } => DescriptionKind::RoundaboutLeave,
            Self::MotorwayEnter { .. } => DescriptionKind::MotorwayEnter,
            Self::MotorwayChange { .. } => DescriptionKind::MotorwayChange,
            Self::MotorwayLeave { .. } => DescriptionKind::MotorwayLeave,
            Self::NameChanged { .. } => DescriptionKind::NameChanged,
        }
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(s) => write!(f, "start: {s}"),
            Self::Target(s) => write!(f, "target: {s}"),
            Self::WayName(n) => write!(f, "on {n}"),
            Self::CrossingWays(c) => {
                write!(f, "{} exit(s)", c.exit_count)?;
                for (i, n) in c.crossing.iter().enumerate() {
                    f.write_str(if i == 0 { ", crossing " } else { ", " })?;
                    write!(f, "{n}")?;
                }
                Ok(())
            }
            Self::Direction(d) => write!(f, "{} ({:.0}°)", d.curve, d.curve_angle),
            Self::Turn => f.write_str("turn"),
            Self::RoundaboutEnter { clockwise } => {
                write!(f, "enter {} roundabout", if *clockwise { "clockwise" } else { "counter-clockwise" })
            }
            Self::RoundaboutLeave { exit_count, .. } => write!(f, "leave roundabout at exit {exit_count}"),
            Self::MotorwayEnter { to: Some(to) } => write!(f, "enter motorway {to}"),
            Self::MotorwayEnter { to: None } => f.write_str("enter motorway"),
            Self::MotorwayChange { from, to } => write!(f, "change motorway from {from} to {to}"),
            Self::MotorwayLeave { from } => write!(f, "leave motorway {from}"),
            Self::NameChanged { from, to } => write!(f, "name changes from {from} to {to}"),
        }
    }
}

/// One node of a [RouteDescription].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub database: DatabaseId,
    pub node_id: NodeId,
    pub current_node_index: usize,
    pub objects: Vec<ObjectFileRef>,
    pub path_object: Option<ObjectFileRef>,
    pub target_node_index: usize,
    /// Distance from the start, in kilometers.
    pub distance: f64,
    /// Travel time from the start, in hours.
    pub time: f64,
    pub location: GeoCoord,
    pub descriptions: Vec<Description>,
}

impl Node {
    pub fn from_entry(entry: &RouteEntry) -> Self {
        Self {
            database: entry.database,
            node_id: entry.node_id,
            current_node_index: entry.current_node_index,
            objects: entry.objects.clone(),
            path_object: entry.path_object,
            target_node_index: entry.target_node_index,
            distance: 0.0,
            time: 0.0,
            location: entry.node_id.coord(),
            descriptions: Vec::new(),
        }
    }

    /// Attaches a description, replacing any previous one of the same kind.
    pub fn add_description(&mut self, d: Description) {
        let kind = d.kind();
        match self.descriptions.iter_mut().find(|e| e.kind() == kind) {
            Some(existing) => *existing = d,
            None => self.descriptions.push(d),
        }
    }

    pub fn description(&self, kind: DescriptionKind) -> Option<&Description> {
        self.descriptions.iter().find(|d| d.kind() == kind)
    }

    pub fn has_description(&self, kind: DescriptionKind) -> bool {
        self.description(kind).is_some()
    }

    pub fn name(&self) -> Option<&NameDescription> {
        match self.description(DescriptionKind::WayName) {
            Some(Description::WayName(n)) => Some(n),
            _ => None,
        }
    }

    pub fn direction(&self) -> Option<&DirectionDescription> {
        match self.description(DescriptionKind::Direction) {
            Some(Description::Direction(d)) => Some(d),
            _ => None,
        }
    }

    pub fn crossing_ways(&self) -> Option<&CrossingWaysDescription> {
        match self.description(DescriptionKind::CrossingWays) {
            Some(Description::CrossingWays(c)) => Some(c),
            _ => None,
        }
    }
}

/// Annotated route: one [Node] per way node passed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteDescription {
    pub nodes: Vec<Node>,
}

impl RouteDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }
}

impl From<&RouteData> for RouteDescription {
    fn from(data: &RouteData) -> Self {
        Self {
            nodes: data.iter().map(Node::from_entry).collect(),
        }
    }
}
