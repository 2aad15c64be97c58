//! Domain model (IDs, task envelope, order view, events, outcomes, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod order;
pub mod outcome;
pub mod task;

pub use errors::{ErrorKind, TaskError};
pub use events::{OrderEvent, OrderEventKind};
pub use ids::{EventId, LeaseId, TaskId};
pub use order::{HomestayOrder, OrderSn, OrderStatus};
pub use outcome::{Outcome, OutcomeKind};
pub use task::{NewTask, TaskEnvelope, TaskType};
