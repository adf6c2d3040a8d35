pub mod core;
pub mod error;
pub mod flow;
pub mod kernel;

// Re-export commonly used types
pub use crate::core::activity::{ActivityConfig, ActivityId};
pub use crate::core::buffer::{BufferRole, Capacity};
pub use crate::core::entity::{Batch, Entity, EntityState, Item};
pub use crate::core::gate::BatchPolicy;
pub use crate::core::processor::Routine;
pub use crate::core::routing::RouteTarget;
pub use crate::core::simulation::{ActivitySnapshot, GeneratorId, Simulation};
pub use crate::error::{ConfigError, SimError};
pub use crate::flow::generator::ArrivalPattern;
pub use crate::flow::shift::{ShiftPlan, ShiftSpan};
pub use crate::kernel::process::SimTime;
pub use crate::kernel::resource::ResourceId;
