// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::hash_map::{Entry, HashMap};

use super::PostprocessError;
use crate::database::{ObjectDatabase, RoutableObject};
use crate::graph::{NodeId, ObjectFileRef};
use crate::profile::CostModel;
use crate::route::{DatabaseId, DbObjectRef, NameDescription, Node, RouteDescription};
use crate::{Breaker, TypeConfig};

/// Objects and cost model of one database, as seen by the post-processor.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseContext<'a> {
    pub objects: &'a dyn ObjectDatabase,
    pub profile: &'a dyn CostModel,
}

/// Shared state of all passes of one run. Every object referenced
/// by the description is loaded up front.
pub(super) struct Context<'a> {
    databases: Vec<DatabaseContext<'a>>,
    objects: HashMap<DbObjectRef, RoutableObject>,
    breaker: Option<&'a Breaker>,
}

impl<'a> Context<'a> {
    pub fn new(
        databases: Vec<DatabaseContext<'a>>,
        description: &RouteDescription,
        breaker: Option<&'a Breaker>,
    ) -> Result<Self, PostprocessError> {
        let mut objects = HashMap::new();
        for node in description.iter() {
            let db = databases
                .get(node.database.index())
                .ok_or(PostprocessError::UnknownDatabase(node.database))?;

            for &object in node.objects.iter().chain(node.path_object.iter()) {
                let key = DbObjectRef {
                    database: node.database,
                    object,
                };
                if let Entry::Vacant(e) = objects.entry(key) {
                    e.insert(db.objects.object(object)?);
                }
            }
        }

        Ok(Self {
            databases,
            objects,
            breaker,
        })
    }

    /// Fails with [PostprocessError::Cancelled] once the breaker is triggered.
    pub fn poll(&self) -> Result<(), PostprocessError> {
        if self.breaker.is_some_and(Breaker::is_cancelled) {
            Err(PostprocessError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    pub fn types(&self, database: DatabaseId) -> Result<&TypeConfig, PostprocessError> {
        Ok(self.database(database)?.objects.types())
    }

    pub fn profile(&self, database: DatabaseId) -> Result<&dyn CostModel, PostprocessError> {
        Ok(self.database(database)?.profile)
    }

    fn database(&self, database: DatabaseId) -> Result<&DatabaseContext<'a>, PostprocessError> {
        self.databases
            .get(database.index())
            .ok_or(PostprocessError::UnknownDatabase(database))
    }

    pub fn object(&self, database: DatabaseId, object: ObjectFileRef) -> Result<&RoutableObject, PostprocessError> {
        self.objects
            .get(&DbObjectRef { database, object })
            .ok_or(PostprocessError::MissingObject { database, object })
    }

    /// The object the route leaves `node` on, `None` for the last node.
    pub fn path_object(&self, node: &Node) -> Result<Option<&RoutableObject>, PostprocessError> {
        node.path_object
            .map(|object| self.object(node.database, object))
            .transpose()
    }

    /// Name and reference of an object. Areas carry no reference.
    pub fn name(&self, database: DatabaseId, object: ObjectFileRef) -> Result<NameDescription, PostprocessError> {
        let o = self.object(database, object)?;
        let reference = if o.is_area() { "" } else { o.ref_name() };
        Ok(NameDescription::new(o.name(), reference))
    }

    /// Checks if `object` can be left from node `from` in the direction of its nodes.
    pub fn can_use_forward(
        &self,
        database: DatabaseId,
        from: NodeId,
        object: ObjectFileRef,
    ) -> Result<bool, PostprocessError> {
        let o = self.object(database, object)?;
        let profile = self.profile(database)?;
        Ok(match o {
            RoutableObject::Area(_) => profile.can_use_object(o),
            RoutableObject::Way(_) => {
                o.node_index(from).is_some_and(|i| i + 1 < o.node_count()) && profile.can_use_forward(o)
            }
        })
    }

    /// Checks if `object` can be left from node `from` against the direction of its nodes.
    pub fn can_use_backward(
        &self,
        database: DatabaseId,
        from: NodeId,
        object: ObjectFileRef,
    ) -> Result<bool, PostprocessError> {
        let o = self.object(database, object)?;
        let profile = self.profile(database)?;
        Ok(match o {
            RoutableObject::Area(_) => profile.can_use_object(o),
            RoutableObject::Way(_) => o.node_index(from).is_some_and(|i| i > 0) && profile.can_use_backward(o),
        })
    }

    pub fn is_roundabout(&self, node: &Node) -> Result<bool, PostprocessError> {
        Ok(self.path_object(node)?.is_some_and(RoutableObject::is_roundabout))
    }
}
