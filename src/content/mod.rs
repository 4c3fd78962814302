//! Content catalog
//!
//! The static containment tree the engine gates access to:
//! program -> module -> topic -> lesson -> {resources, assignments},
//! with assignments also attachable directly to a topic.
//!
//! The catalog is immutable once built. `CatalogBuilder::build` validates
//! parent references, sequence orders and the explicit prerequisite graph
//! (no self-references, no cycles) so runtime code can assume a
//! well-formed, acyclic structure.

pub mod builder;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::ProgressConfig;
use crate::types::{ProgramId, UnitId, UnitKind, UnitRef};

pub use builder::CatalogBuilder;

/// A module of a program, completed over roughly a month
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: UnitId,
    pub program: ProgramId,
    pub title: String,
    /// Short code shown on transcripts, e.g. "GCA-M101"
    pub course_code: String,
    pub credits: u32,
    pub sequence_order: u32,
    /// Per-module completion threshold; falls back to the configured
    /// default when absent
    pub minimum_completion_percentage: Option<f64>,
    pub is_active: bool,
    /// Modules that must be completed before this one opens, in
    /// addition to sequence gating
    pub prerequisites: Vec<UnitId>,
}

impl CourseModule {
    pub fn new(program: ProgramId, title: &str, course_code: &str, sequence_order: u32) -> Self {
        Self {
            id: UnitId::new(),
            program,
            title: title.to_string(),
            course_code: course_code.to_string(),
            credits: 2,
            sequence_order,
            minimum_completion_percentage: None,
            is_active: true,
            prerequisites: Vec::new(),
        }
    }

    pub fn with_credits(mut self, credits: u32) -> Self {
        self.credits = credits;
        self
    }

    pub fn with_minimum_completion(mut self, percentage: f64) -> Self {
        self.minimum_completion_percentage = Some(percentage);
        self
    }

    pub fn with_prerequisites(mut self, prerequisites: Vec<UnitId>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A topic within a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: UnitId,
    pub module: UnitId,
    pub title: String,
    pub sequence_order: u32,
    /// Optional credit weight; when every active topic of a module
    /// declares one, the module percentage is credit-weighted
    pub credit_weight: Option<u32>,
    pub is_active: bool,
    pub prerequisites: Vec<UnitId>,
}

impl Topic {
    pub fn new(module: UnitId, title: &str, sequence_order: u32) -> Self {
        Self {
            id: UnitId::new(),
            module,
            title: title.to_string(),
            sequence_order,
            credit_weight: None,
            is_active: true,
            prerequisites: Vec::new(),
        }
    }

    pub fn with_credit_weight(mut self, weight: u32) -> Self {
        self.credit_weight = Some(weight);
        self
    }

    pub fn with_prerequisites(mut self, prerequisites: Vec<UnitId>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A lesson within a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: UnitId,
    pub topic: UnitId,
    pub title: String,
    pub lesson_number: u32,
    pub is_active: bool,
    pub prerequisites: Vec<UnitId>,
}

impl Lesson {
    pub fn new(topic: UnitId, title: &str, lesson_number: u32) -> Self {
        Self {
            id: UnitId::new(),
            topic,
            title: title.to_string(),
            lesson_number,
            is_active: true,
            prerequisites: Vec::new(),
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: Vec<UnitId>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Delivery format of a learning resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Video,
    Pdf,
    Document,
    Link,
}

/// A learning resource (video, reading, link) within a lesson
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceItem {
    pub id: UnitId,
    pub lesson: UnitId,
    pub title: String,
    pub kind: ResourceKind,
    pub order: u32,
    /// Only required resources count toward lesson completion
    pub is_required: bool,
    pub is_active: bool,
}

impl ResourceItem {
    pub fn new(lesson: UnitId, title: &str, kind: ResourceKind, order: u32) -> Self {
        Self {
            id: UnitId::new(),
            lesson,
            title: title.to_string(),
            kind,
            order,
            is_required: true,
            is_active: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Where an assignment hangs in the tree
///
/// A tagged variant instead of two nullable parent references: an
/// assignment belongs to exactly one of a lesson or a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentParent {
    Lesson(UnitId),
    Topic(UnitId),
}

impl AssignmentParent {
    pub fn unit_id(&self) -> UnitId {
        match self {
            AssignmentParent::Lesson(id) | AssignmentParent::Topic(id) => *id,
        }
    }
}

/// A gradeable assignment attached to a lesson or a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: UnitId,
    pub parent: AssignmentParent,
    pub title: String,
    pub max_points: u32,
    /// Days after the parent unit unlocks before the submission is late
    pub due_in_days: Option<i64>,
    pub is_required: bool,
    pub is_active: bool,
}

impl Assignment {
    pub fn new(parent: AssignmentParent, title: &str) -> Self {
        Self {
            id: UnitId::new(),
            parent,
            title: title.to_string(),
            max_points: 100,
            due_in_days: Some(7),
            is_required: true,
            is_active: true,
        }
    }

    pub fn with_max_points(mut self, points: u32) -> Self {
        self.max_points = points;
        self
    }

    pub fn due_in(mut self, days: i64) -> Self {
        self.due_in_days = Some(days);
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Validated, immutable content structure with ordered child indexes
#[derive(Debug, Default)]
pub struct ContentCatalog {
    pub(crate) modules: HashMap<UnitId, CourseModule>,
    pub(crate) topics: HashMap<UnitId, Topic>,
    pub(crate) lessons: HashMap<UnitId, Lesson>,
    pub(crate) resources: HashMap<UnitId, ResourceItem>,
    pub(crate) assignments: HashMap<UnitId, Assignment>,

    // Children sorted by sequence order, inactive entries included
    pub(crate) module_order: HashMap<ProgramId, Vec<UnitId>>,
    pub(crate) topic_order: HashMap<UnitId, Vec<UnitId>>,
    pub(crate) lesson_order: HashMap<UnitId, Vec<UnitId>>,
    pub(crate) resource_order: HashMap<UnitId, Vec<UnitId>>,
    pub(crate) lesson_assignments: HashMap<UnitId, Vec<UnitId>>,
    pub(crate) topic_assignments: HashMap<UnitId, Vec<UnitId>>,

    // Reverse edges of the explicit prerequisite graph
    pub(crate) dependents: HashMap<UnitId, Vec<UnitRef>>,
}

impl ContentCatalog {
    /// Start building a catalog
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Granularity of a unit, if it exists
    pub fn kind_of(&self, id: UnitId) -> Option<UnitKind> {
        if self.modules.contains_key(&id) {
            Some(UnitKind::Module)
        } else if self.topics.contains_key(&id) {
            Some(UnitKind::Topic)
        } else if self.lessons.contains_key(&id) {
            Some(UnitKind::Lesson)
        } else if self.resources.contains_key(&id) {
            Some(UnitKind::Resource)
        } else if self.assignments.contains_key(&id) {
            Some(UnitKind::Assignment)
        } else {
            None
        }
    }

    pub fn module(&self, id: UnitId) -> Option<&CourseModule> {
        self.modules.get(&id)
    }

    pub fn topic(&self, id: UnitId) -> Option<&Topic> {
        self.topics.get(&id)
    }

    pub fn lesson(&self, id: UnitId) -> Option<&Lesson> {
        self.lessons.get(&id)
    }

    pub fn resource(&self, id: UnitId) -> Option<&ResourceItem> {
        self.resources.get(&id)
    }

    pub fn assignment(&self, id: UnitId) -> Option<&Assignment> {
        self.assignments.get(&id)
    }

    /// Whether the unit itself is active (ancestors are checked level by
    /// level during gating, not here)
    pub fn is_active(&self, unit: UnitRef) -> bool {
        match unit.kind {
            UnitKind::Module => self.modules.get(&unit.id).is_some_and(|m| m.is_active),
            UnitKind::Topic => self.topics.get(&unit.id).is_some_and(|t| t.is_active),
            UnitKind::Lesson => self.lessons.get(&unit.id).is_some_and(|l| l.is_active),
            UnitKind::Resource => self.resources.get(&unit.id).is_some_and(|r| r.is_active),
            UnitKind::Assignment => self.assignments.get(&unit.id).is_some_and(|a| a.is_active),
        }
    }

    /// Display title of any unit
    pub fn title_of(&self, unit: UnitRef) -> Option<&str> {
        match unit.kind {
            UnitKind::Module => self.modules.get(&unit.id).map(|m| m.title.as_str()),
            UnitKind::Topic => self.topics.get(&unit.id).map(|t| t.title.as_str()),
            UnitKind::Lesson => self.lessons.get(&unit.id).map(|l| l.title.as_str()),
            UnitKind::Resource => self.resources.get(&unit.id).map(|r| r.title.as_str()),
            UnitKind::Assignment => self.assignments.get(&unit.id).map(|a| a.title.as_str()),
        }
    }

    /// Containing unit, one level up; `None` for modules
    pub fn parent_of(&self, unit: UnitRef) -> Option<UnitRef> {
        match unit.kind {
            UnitKind::Module => None,
            UnitKind::Topic => self
                .topics
                .get(&unit.id)
                .map(|t| UnitRef::new(UnitKind::Module, t.module)),
            UnitKind::Lesson => self
                .lessons
                .get(&unit.id)
                .map(|l| UnitRef::new(UnitKind::Topic, l.topic)),
            UnitKind::Resource => self
                .resources
                .get(&unit.id)
                .map(|r| UnitRef::new(UnitKind::Lesson, r.lesson)),
            UnitKind::Assignment => self.assignments.get(&unit.id).map(|a| match a.parent {
                AssignmentParent::Lesson(id) => UnitRef::new(UnitKind::Lesson, id),
                AssignmentParent::Topic(id) => UnitRef::new(UnitKind::Topic, id),
            }),
        }
    }

    /// Program a unit ultimately belongs to
    pub fn program_of(&self, unit: UnitRef) -> Option<ProgramId> {
        let mut current = unit;
        loop {
            if current.kind == UnitKind::Module {
                return self.modules.get(&current.id).map(|m| m.program);
            }
            current = self.parent_of(current)?;
        }
    }

    /// Active modules of a program in sequence order
    pub fn active_modules(&self, program: ProgramId) -> Vec<&CourseModule> {
        self.module_order
            .get(&program)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.modules.get(id))
                    .filter(|m| m.is_active)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Active topics of a module in sequence order
    pub fn active_topics(&self, module: UnitId) -> Vec<&Topic> {
        self.topic_order
            .get(&module)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.topics.get(id))
                    .filter(|t| t.is_active)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Active lessons of a topic in lesson-number order
    pub fn active_lessons(&self, topic: UnitId) -> Vec<&Lesson> {
        self.lesson_order
            .get(&topic)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.lessons.get(id))
                    .filter(|l| l.is_active)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Active resources of a lesson in display order
    pub fn active_resources(&self, lesson: UnitId) -> Vec<&ResourceItem> {
        self.resource_order
            .get(&lesson)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.resources.get(id))
                    .filter(|r| r.is_active)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Required, active resources of a lesson
    pub fn required_resources(&self, lesson: UnitId) -> Vec<&ResourceItem> {
        self.active_resources(lesson)
            .into_iter()
            .filter(|r| r.is_required)
            .collect()
    }

    /// Required, active assignments attached directly to a lesson
    pub fn required_lesson_assignments(&self, lesson: UnitId) -> Vec<&Assignment> {
        self.lesson_assignments
            .get(&lesson)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.assignments.get(id))
                    .filter(|a| a.is_active && a.is_required)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Required, active assignments gating a topic: those attached to
    /// the topic itself plus those of every active lesson in it
    pub fn topic_gate_assignments(&self, topic: UnitId) -> Vec<&Assignment> {
        let mut gate: Vec<&Assignment> = self
            .topic_assignments
            .get(&topic)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.assignments.get(id))
                    .filter(|a| a.is_active && a.is_required)
                    .collect()
            })
            .unwrap_or_default();

        for lesson in self.active_lessons(topic) {
            gate.extend(self.required_lesson_assignments(lesson.id));
        }
        gate
    }

    /// First active module of a program
    pub fn first_module(&self, program: ProgramId) -> Option<&CourseModule> {
        self.active_modules(program).into_iter().next()
    }

    /// First active topic of a module
    pub fn first_topic(&self, module: UnitId) -> Option<&Topic> {
        self.active_topics(module).into_iter().next()
    }

    /// First active lesson of a topic
    pub fn first_lesson(&self, topic: UnitId) -> Option<&Lesson> {
        self.active_lessons(topic).into_iter().next()
    }

    /// Whether the unit is the first active one under its parent
    pub fn is_first_in_sequence(&self, unit: UnitRef) -> bool {
        match unit.kind {
            UnitKind::Module => self
                .modules
                .get(&unit.id)
                .and_then(|m| self.first_module(m.program))
                .is_some_and(|first| first.id == unit.id),
            UnitKind::Topic => self
                .topics
                .get(&unit.id)
                .and_then(|t| self.first_topic(t.module))
                .is_some_and(|first| first.id == unit.id),
            UnitKind::Lesson => self
                .lessons
                .get(&unit.id)
                .and_then(|l| self.first_lesson(l.topic))
                .is_some_and(|first| first.id == unit.id),
            UnitKind::Resource | UnitKind::Assignment => false,
        }
    }

    /// Next active sibling by sequence order, if any
    pub fn next_sibling(&self, unit: UnitRef) -> Option<UnitRef> {
        let siblings = self.active_siblings(unit)?;
        let pos = siblings.iter().position(|id| *id == unit.id)?;
        siblings
            .get(pos + 1)
            .map(|id| UnitRef::new(unit.kind, *id))
    }

    /// Immediately preceding active sibling by sequence order, if any
    pub fn preceding_sibling(&self, unit: UnitRef) -> Option<UnitRef> {
        let siblings = self.active_siblings(unit)?;
        let pos = siblings.iter().position(|id| *id == unit.id)?;
        pos.checked_sub(1)
            .and_then(|p| siblings.get(p))
            .map(|id| UnitRef::new(unit.kind, *id))
    }

    fn active_siblings(&self, unit: UnitRef) -> Option<Vec<UnitId>> {
        let ids: Vec<UnitId> = match unit.kind {
            UnitKind::Module => {
                let m = self.modules.get(&unit.id)?;
                self.module_order
                    .get(&m.program)?
                    .iter()
                    .filter(|id| self.modules.get(id).is_some_and(|m| m.is_active))
                    .copied()
                    .collect()
            }
            UnitKind::Topic => {
                let t = self.topics.get(&unit.id)?;
                self.topic_order
                    .get(&t.module)?
                    .iter()
                    .filter(|id| self.topics.get(id).is_some_and(|t| t.is_active))
                    .copied()
                    .collect()
            }
            UnitKind::Lesson => {
                let l = self.lessons.get(&unit.id)?;
                self.lesson_order
                    .get(&l.topic)?
                    .iter()
                    .filter(|id| self.lessons.get(id).is_some_and(|l| l.is_active))
                    .copied()
                    .collect()
            }
            UnitKind::Resource | UnitKind::Assignment => return None,
        };
        Some(ids)
    }

    /// Explicit prerequisites declared on a unit
    pub fn prerequisites_of(&self, unit: UnitRef) -> &[UnitId] {
        match unit.kind {
            UnitKind::Module => self
                .modules
                .get(&unit.id)
                .map(|m| m.prerequisites.as_slice()),
            UnitKind::Topic => self.topics.get(&unit.id).map(|t| t.prerequisites.as_slice()),
            UnitKind::Lesson => self
                .lessons
                .get(&unit.id)
                .map(|l| l.prerequisites.as_slice()),
            UnitKind::Resource | UnitKind::Assignment => None,
        }
        .unwrap_or(&[])
    }

    /// Units anywhere in the catalog that list `unit` as an explicit
    /// prerequisite
    pub fn dependents_of(&self, unit: UnitId) -> &[UnitRef] {
        self.dependents.get(&unit).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Completion threshold for a unit: modules use their declared
    /// minimum (or the configured default); everything else completes
    /// at 100 since the assignment cap already encodes the gate
    pub fn completion_threshold(&self, unit: UnitRef, config: &ProgressConfig) -> f64 {
        match unit.kind {
            UnitKind::Module => self
                .modules
                .get(&unit.id)
                .and_then(|m| m.minimum_completion_percentage)
                .unwrap_or(config.default_module_completion_percentage),
            _ => 100.0,
        }
    }

    /// Total credits of the active modules in a program
    pub fn program_credits(&self, program: ProgramId) -> u32 {
        self.active_modules(program).iter().map(|m| m.credits).sum()
    }

    /// Every unit id under a program, active or not (administrative
    /// reset scope)
    pub fn program_unit_ids(&self, program: ProgramId) -> Vec<UnitId> {
        let mut ids = Vec::new();
        for module_id in self.module_order.get(&program).into_iter().flatten() {
            ids.push(*module_id);
            for topic_id in self.topic_order.get(module_id).into_iter().flatten() {
                ids.push(*topic_id);
                ids.extend(
                    self.topic_assignments
                        .get(topic_id)
                        .into_iter()
                        .flatten()
                        .copied(),
                );
                for lesson_id in self.lesson_order.get(topic_id).into_iter().flatten() {
                    ids.push(*lesson_id);
                    ids.extend(
                        self.resource_order
                            .get(lesson_id)
                            .into_iter()
                            .flatten()
                            .copied(),
                    );
                    ids.extend(
                        self.lesson_assignments
                            .get(lesson_id)
                            .into_iter()
                            .flatten()
                            .copied(),
                    );
                }
            }
        }
        ids
    }
}
