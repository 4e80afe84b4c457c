//! Domain Models

pub mod agent;
pub mod request;
pub mod shift;

// Re-exports
pub use agent::{Agent, AgentRole};
pub use request::{
    Priority, RequestCreate, RequestQuery, RequestStatus, RequestType, RequestUpdate,
    SupportRequest,
};
pub use shift::{Shift, ShiftCreate, ShiftQuery, ShiftStatus, ShiftType, ShiftUpdate};
