//! Catalog construction and validation
//!
//! Content authoring hands the builder a flat list of units; `build`
//! wires the child indexes and rejects malformed structure. Prerequisite
//! cycles are a configuration-time error only — the runtime gate and
//! cascade assume the graph is acyclic.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::CatalogError;
use crate::types::{UnitId, UnitKind, UnitRef};

use super::{Assignment, AssignmentParent, ContentCatalog, CourseModule, Lesson, ResourceItem, Topic};

/// Accumulates units, then validates and freezes them into a catalog
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    modules: Vec<CourseModule>,
    topics: Vec<Topic>,
    lessons: Vec<Lesson>,
    resources: Vec<ResourceItem>,
    assignments: Vec<Assignment>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, module: CourseModule) -> Self {
        self.modules.push(module);
        self
    }

    pub fn topic(mut self, topic: Topic) -> Self {
        self.topics.push(topic);
        self
    }

    pub fn lesson(mut self, lesson: Lesson) -> Self {
        self.lessons.push(lesson);
        self
    }

    pub fn resource(mut self, resource: ResourceItem) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn assignment(mut self, assignment: Assignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    /// Validate and build the immutable catalog
    pub fn build(self) -> Result<ContentCatalog, CatalogError> {
        let mut catalog = ContentCatalog::default();

        let mut seen: HashSet<UnitId> = HashSet::new();
        let mut check_unique = |id: UnitId| -> Result<(), CatalogError> {
            if !seen.insert(id) {
                return Err(CatalogError::DuplicateUnit(id));
            }
            Ok(())
        };

        for module in self.modules {
            check_unique(module.id)?;
            catalog
                .module_order
                .entry(module.program)
                .or_default()
                .push(module.id);
            catalog.modules.insert(module.id, module);
        }

        for topic in self.topics {
            check_unique(topic.id)?;
            if !catalog.modules.contains_key(&topic.module) {
                return Err(CatalogError::UnknownParent {
                    child: topic.id,
                    parent: topic.module,
                });
            }
            catalog
                .topic_order
                .entry(topic.module)
                .or_default()
                .push(topic.id);
            catalog.topics.insert(topic.id, topic);
        }

        for lesson in self.lessons {
            check_unique(lesson.id)?;
            if !catalog.topics.contains_key(&lesson.topic) {
                return Err(CatalogError::UnknownParent {
                    child: lesson.id,
                    parent: lesson.topic,
                });
            }
            catalog
                .lesson_order
                .entry(lesson.topic)
                .or_default()
                .push(lesson.id);
            catalog.lessons.insert(lesson.id, lesson);
        }

        for resource in self.resources {
            check_unique(resource.id)?;
            if !catalog.lessons.contains_key(&resource.lesson) {
                return Err(CatalogError::UnknownParent {
                    child: resource.id,
                    parent: resource.lesson,
                });
            }
            catalog
                .resource_order
                .entry(resource.lesson)
                .or_default()
                .push(resource.id);
            catalog.resources.insert(resource.id, resource);
        }

        for assignment in self.assignments {
            check_unique(assignment.id)?;
            match assignment.parent {
                AssignmentParent::Lesson(lesson) => {
                    if !catalog.lessons.contains_key(&lesson) {
                        return Err(CatalogError::UnknownParent {
                            child: assignment.id,
                            parent: lesson,
                        });
                    }
                    catalog
                        .lesson_assignments
                        .entry(lesson)
                        .or_default()
                        .push(assignment.id);
                }
                AssignmentParent::Topic(topic) => {
                    if !catalog.topics.contains_key(&topic) {
                        return Err(CatalogError::UnknownParent {
                            child: assignment.id,
                            parent: topic,
                        });
                    }
                    catalog
                        .topic_assignments
                        .entry(topic)
                        .or_default()
                        .push(assignment.id);
                }
            }
            catalog.assignments.insert(assignment.id, assignment);
        }

        sort_children(&mut catalog);
        check_sequence_orders(&catalog)?;
        check_prerequisites(&mut catalog)?;

        debug!(
            modules = catalog.modules.len(),
            topics = catalog.topics.len(),
            lessons = catalog.lessons.len(),
            resources = catalog.resources.len(),
            assignments = catalog.assignments.len(),
            "content catalog built"
        );
        Ok(catalog)
    }
}

fn sort_children(catalog: &mut ContentCatalog) {
    let modules = &catalog.modules;
    for ids in catalog.module_order.values_mut() {
        ids.sort_by_key(|id| modules[id].sequence_order);
    }
    let topics = &catalog.topics;
    for ids in catalog.topic_order.values_mut() {
        ids.sort_by_key(|id| topics[id].sequence_order);
    }
    let lessons = &catalog.lessons;
    for ids in catalog.lesson_order.values_mut() {
        ids.sort_by_key(|id| lessons[id].lesson_number);
    }
    let resources = &catalog.resources;
    for ids in catalog.resource_order.values_mut() {
        ids.sort_by_key(|id| resources[id].order);
    }
}

fn check_sequence_orders(catalog: &ContentCatalog) -> Result<(), CatalogError> {
    for ids in catalog.module_order.values() {
        let mut orders = HashSet::new();
        for id in ids {
            let order = catalog.modules[id].sequence_order;
            if !orders.insert(order) {
                return Err(CatalogError::DuplicateSequenceOrder { unit: *id, order });
            }
        }
    }
    for ids in catalog.topic_order.values() {
        let mut orders = HashSet::new();
        for id in ids {
            let order = catalog.topics[id].sequence_order;
            if !orders.insert(order) {
                return Err(CatalogError::DuplicateSequenceOrder { unit: *id, order });
            }
        }
    }
    for ids in catalog.lesson_order.values() {
        let mut orders = HashSet::new();
        for id in ids {
            let order = catalog.lessons[id].lesson_number;
            if !orders.insert(order) {
                return Err(CatalogError::DuplicateSequenceOrder { unit: *id, order });
            }
        }
    }
    Ok(())
}

fn granularity_rank(kind: UnitKind) -> u8 {
    match kind {
        UnitKind::Module => 0,
        UnitKind::Topic => 1,
        UnitKind::Lesson => 2,
        UnitKind::Resource | UnitKind::Assignment => 3,
    }
}

/// Validate prerequisite references and build the reverse index
fn check_prerequisites(catalog: &mut ContentCatalog) -> Result<(), CatalogError> {
    let mut edges: HashMap<UnitId, Vec<UnitId>> = HashMap::new();
    let mut dependents: HashMap<UnitId, Vec<UnitRef>> = HashMap::new();

    let units: Vec<UnitRef> = catalog
        .modules
        .keys()
        .map(|id| UnitRef::new(UnitKind::Module, *id))
        .chain(
            catalog
                .topics
                .keys()
                .map(|id| UnitRef::new(UnitKind::Topic, *id)),
        )
        .chain(
            catalog
                .lessons
                .keys()
                .map(|id| UnitRef::new(UnitKind::Lesson, *id)),
        )
        .collect();

    for unit in &units {
        for prereq in catalog.prerequisites_of(*unit) {
            if *prereq == unit.id {
                return Err(CatalogError::SelfPrerequisite(unit.id));
            }
            let prereq_kind = catalog
                .kind_of(*prereq)
                .ok_or(CatalogError::UnknownPrerequisite {
                    unit: unit.id,
                    prerequisite: *prereq,
                })?;
            // A prerequisite must be the same granularity or coarser
            if granularity_rank(prereq_kind) > granularity_rank(unit.kind) {
                return Err(CatalogError::MismatchedPrerequisite {
                    unit: unit.id,
                    prerequisite: *prereq,
                });
            }
            edges.entry(unit.id).or_default().push(*prereq);
            dependents.entry(*prereq).or_default().push(*unit);
        }
    }

    detect_cycles(&units, &edges)?;
    catalog.dependents = dependents;
    Ok(())
}

/// Three-color depth-first search over the prerequisite edges
fn detect_cycles(
    units: &[UnitRef],
    edges: &HashMap<UnitId, Vec<UnitId>>,
) -> Result<(), CatalogError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors: HashMap<UnitId, Color> =
        units.iter().map(|u| (u.id, Color::White)).collect();

    fn visit(
        node: UnitId,
        edges: &HashMap<UnitId, Vec<UnitId>>,
        colors: &mut HashMap<UnitId, Color>,
    ) -> Result<(), CatalogError> {
        colors.insert(node, Color::Gray);
        for next in edges.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
            match colors.get(next).copied().unwrap_or(Color::Black) {
                Color::Gray => return Err(CatalogError::PrerequisiteCycle(*next)),
                Color::White => visit(*next, edges, colors)?,
                Color::Black => {}
            }
        }
        colors.insert(node, Color::Black);
        Ok(())
    }

    for unit in units {
        if colors.get(&unit.id) == Some(&Color::White) {
            visit(unit.id, edges, &mut colors)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProgramId;

    #[test]
    fn test_rejects_self_prerequisite() {
        let program = ProgramId::new();
        let mut m1 = CourseModule::new(program, "M1", "GCA-M101", 1);
        m1.prerequisites = vec![m1.id];

        let err = ContentCatalog::builder().module(m1).build().unwrap_err();
        assert!(matches!(err, CatalogError::SelfPrerequisite(_)));
    }

    #[test]
    fn test_rejects_cycle() {
        let program = ProgramId::new();
        let mut m1 = CourseModule::new(program, "M1", "GCA-M101", 1);
        let mut m2 = CourseModule::new(program, "M2", "GCA-M102", 2);
        m1.prerequisites = vec![m2.id];
        m2.prerequisites = vec![m1.id];

        let err = ContentCatalog::builder()
            .module(m1)
            .module(m2)
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::PrerequisiteCycle(_)));
    }

    #[test]
    fn test_rejects_unknown_parent() {
        let err = ContentCatalog::builder()
            .topic(Topic::new(UnitId::new(), "Orphan", 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownParent { .. }));
    }

    #[test]
    fn test_rejects_finer_grained_prerequisite() {
        let program = ProgramId::new();
        let m1 = CourseModule::new(program, "M1", "GCA-M101", 1);
        let t1 = Topic::new(m1.id, "T1", 1);
        let l1 = Lesson::new(t1.id, "L1", 1);
        // A module cannot depend on a lesson
        let m2 = CourseModule::new(program, "M2", "GCA-M102", 2).with_prerequisites(vec![l1.id]);

        let err = ContentCatalog::builder()
            .module(m1)
            .module(m2)
            .topic(t1)
            .lesson(l1)
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::MismatchedPrerequisite { .. }));
    }

    #[test]
    fn test_rejects_duplicate_sequence_order() {
        let program = ProgramId::new();
        let m1 = CourseModule::new(program, "M1", "GCA-M101", 1);
        let t1 = Topic::new(m1.id, "T1", 1);
        let t2 = Topic::new(m1.id, "T2", 1);

        let err = ContentCatalog::builder()
            .module(m1)
            .topic(t1)
            .topic(t2)
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSequenceOrder { .. }));
    }

    #[test]
    fn test_cross_granularity_prerequisite_allowed() {
        // A topic may require a whole earlier module
        let program = ProgramId::new();
        let m1 = CourseModule::new(program, "M1", "GCA-M101", 1);
        let m2 = CourseModule::new(program, "M2", "GCA-M102", 2);
        let t1 = Topic::new(m2.id, "T1", 1).with_prerequisites(vec![m1.id]);

        let catalog = ContentCatalog::builder()
            .module(m1)
            .module(m2)
            .topic(t1)
            .build()
            .unwrap();
        assert_eq!(catalog.dependents_of(catalog.active_modules(program)[0].id).len(), 1);
    }
}
