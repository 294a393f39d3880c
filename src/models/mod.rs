pub mod booking;
pub mod catalog;
pub mod flow;
mod lenient;
pub mod nlu;
pub mod record;
pub mod session;

pub use booking::{Appointment, Patient, STATUS_SCHEDULED};
pub use catalog::Location;
pub use flow::{FieldKind, FieldPath, FieldSpec, FlowDefinition, FlowError, StateDef};
pub use nlu::{NluIntent, NluResult};
pub use record::{BookingRequest, ExtractedRecord};
pub use session::{CollectedData, Session};
