use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    InPipeline,
    Waiting,
    Processing,
    Complete,
}

/// A work unit flowing through the pipeline.
///
/// `step` is an opaque tag naming the instructions currently being executed;
/// it is supplied and interpreted by the embedding domain, never by the
/// coordination protocol.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: Uuid,
    pub state: EntityState,
    pub step: Option<String>,
}

impl Entity {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: EntityState::InPipeline,
            step: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

/// A composite entity: an ordered sequence of items moved as one unit.
///
/// A batch occupies a single buffer slot regardless of how many leaf
/// entities it contains.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    contents: Vec<Item>,
}

impl Batch {
    pub fn new(contents: Vec<Item>) -> Self {
        Self {
            id: Uuid::new_v4(),
            contents,
        }
    }

    pub fn contents(&self) -> &[Item] {
        &self.contents
    }

    pub fn into_contents(self) -> Vec<Item> {
        self.contents
    }
}

/// What a buffer slot holds: a single entity or a batch of items.
#[derive(Debug, Clone)]
pub enum Item {
    Entity(Entity),
    Batch(Batch),
}

impl Item {
    pub fn id(&self) -> Uuid {
        match self {
            Item::Entity(e) => e.id,
            Item::Batch(b) => b.id,
        }
    }

    /// Number of leaf entities, counted recursively. Used for expanded
    /// buffer counts; slot occupancy of any item is always 1.
    pub fn leaf_count(&self) -> usize {
        match self {
            Item::Entity(_) => 1,
            Item::Batch(b) => b.contents.iter().map(Item::leaf_count).sum(),
        }
    }

    /// Set the lifecycle state of every leaf entity.
    pub fn set_state(&mut self, state: EntityState) {
        match self {
            Item::Entity(e) => e.state = state,
            Item::Batch(b) => {
                for item in &mut b.contents {
                    item.set_state(state);
                }
            }
        }
    }

    /// Set the step tag of every leaf entity.
    pub fn set_step(&mut self, step: &str) {
        match self {
            Item::Entity(e) => e.step = Some(step.to_string()),
            Item::Batch(b) => {
                for item in &mut b.contents {
                    item.set_step(step);
                }
            }
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Item::Entity(e) => Some(e),
            Item::Batch(_) => None,
        }
    }

    pub fn as_batch(&self) -> Option<&Batch> {
        match self {
            Item::Batch(b) => Some(b),
            Item::Entity(_) => None,
        }
    }
}
