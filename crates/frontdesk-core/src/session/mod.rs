//! Session domain module.
//!
//! This module contains the conversation state model, the slot merge policy
//! and the store interface.
//!
//! # Module Structure
//!
//! - `model`: Conversation state (`ConversationState`)
//! - `message`: Conversation message types (`MessageRole`, `ConversationMessage`)
//! - `slots`: Slot and identifier types (`SlotKey`, `IdentifierKey`)
//! - `stage`: Advisory stage machine (`ConversationStage`, `Intent`)
//! - `merge`: Merge precedence policy (`SlotPatch`, `apply_patch`)
//! - `store`: Store trait (`SessionStore`)
//!
//! # Usage
//!
//! ```ignore
//! use frontdesk_core::session::{ConversationState, SessionStore, SlotPatch};
//! use frontdesk_core::session::{SlotKey, SlotSource, IdentifierKey};
//! ```

mod merge;
mod message;
mod model;
mod slots;
mod stage;
mod store;

// Re-export public API
pub use merge::{
    MergeMode, MergeReport, OverrideEvent, OverrideOrigin, SkippedSlot, SlotPatch, apply_patch,
};
pub use message::{Channel, ConversationMessage, MessageRole};
pub use model::ConversationState;
pub use slots::{
    AppointmentSlots, AuthoritativeId, IdentifierKey, Identifiers, PatientSlots, SlotKey,
    SlotSource, SlotValue, Slots,
};
pub use stage::{ConversationStage, Intent, StageEvent};
pub use store::{SessionStore, StateMutation};
