//! Function Schema Registry.
//!
//! Static per-function parameter contracts: required/optional fields,
//! defaults, disjunctive groups, domain-format rules, critical identifier
//! fields and the session slots that feed each field.

mod calls;
mod field;
mod registry;
mod rule;

pub use calls::{
    CancelAppointment, CreateAppointment, CreatePatient, FunctionCall, GetAvailableSlots,
    SearchPatients, UpdateAppointment,
};
pub use field::{Field, FunctionName};
pub use registry::{FunctionSchema, ResultIdentifier, SchemaRegistry, SlotBinding};
pub use rule::{
    DATE_FORMAT, DATE_TIME_FORMAT, DomainRule, Literal, compose_date_time, normalize_phone,
    parse_date, split_date_time,
};
