// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Annotation of a [RouteDescription] by an ordered list of [passes](Pass).
//!
//! Every pass walks the nodes of the description and attaches
//! [Descriptions](crate::route::Description) to them. Later passes read
//! what earlier passes attached, so the order matters: [Pass::Direction]
//! needs [Pass::DistanceAndTime], and [Pass::Instruction] needs
//! [Pass::WayName], [Pass::CrossingWays] and [Pass::Direction].

mod basic;
mod context;
mod direction;
mod instruction;

pub use context::DatabaseContext;
pub use instruction::InstructionConfig;

use crate::database::DatabaseError;
use crate::graph::ObjectFileRef;
use crate::route::{DatabaseId, RouteDescription};
use crate::Breaker;
use context::Context;

/// Failure of a post-processing run. The description may be partially
/// annotated and should be discarded.
#[derive(Debug, thiserror::Error)]
pub enum PostprocessError {
    #[error("router is not open")]
    NotOpen,

    #[error("post-processing cancelled")]
    Cancelled,

    #[error("unknown database {0}")]
    UnknownDatabase(DatabaseId),

    /// An object was requested which is not referenced by the description.
    #[error("object {object} of database {database} is not loaded")]
    MissingObject {
        database: DatabaseId,
        object: ObjectFileRef,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// A single post-processing step.
#[derive(Debug, Clone, PartialEq)]
pub enum Pass {
    /// Attaches the given label to the first node.
    Start(String),

    /// Attaches the given label to the last node.
    Target(String),

    /// Sets the running distance, time and location of every node.
    DistanceAndTime,

    /// Attaches the name of the way the route continues on.
    WayName,

    /// Lists exits and other ways meeting at junctions.
    CrossingWays,

    /// Classifies the turn at every node, fusing small consecutive bends.
    Direction,

    /// Derives roundabout, motorway, turn and name change instructions.
    Instruction(InstructionConfig),
}

impl Pass {
    /// The usual pass list, in a working order.
    pub fn default_list(start: &str, target: &str) -> Vec<Pass> {
        vec![
            Pass::Start(start.to_string()),
            Pass::Target(target.to_string()),
            Pass::DistanceAndTime,
            Pass::WayName,
            Pass::CrossingWays,
            Pass::Direction,
            Pass::Instruction(InstructionConfig::default()),
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Pass::Start(_) => "start",
            Pass::Target(_) => "target",
            Pass::DistanceAndTime => "distance and time",
            Pass::WayName => "way name",
            Pass::CrossingWays => "crossing ways",
            Pass::Direction => "direction",
            Pass::Instruction(_) => "instruction",
        }
    }

    fn process(&self, ctx: &Context<'_>, description: &mut RouteDescription) -> Result<(), PostprocessError> {
        match self {
            Pass::Start(label) => basic::start(description, label),
            Pass::Target(label) => basic::target(description, label),
            Pass::DistanceAndTime => basic::distance_and_time(ctx, description),
            Pass::WayName => basic::way_name(ctx, description),
            Pass::CrossingWays => basic::crossing_ways(ctx, description),
            Pass::Direction => direction::direction(ctx, description),
            Pass::Instruction(config) => instruction::instructions(ctx, description, config),
        }
    }
}

/// Runs `passes` over `description`, in order, stopping at the first failure.
///
/// `databases` are indexed by [DatabaseId] of the description's nodes.
pub fn run(
    databases: Vec<DatabaseContext<'_>>,
    description: &mut RouteDescription,
    passes: &[Pass],
    breaker: Option<&Breaker>,
) -> Result<(), PostprocessError> {
    let ctx = Context::new(databases, description, breaker)
        .inspect_err(|e| log::error!("failed to prepare route post-processing: {e}"))?;

    for pass in passes {
        pass.process(&ctx, description)
            .inspect_err(|e| log::error!("{} post-processing failed: {e}", pass.name()))?;
    }
    Ok(())
}
