//! Core type definitions for the simulation kernel.
//!
//! This module defines the small identifier types shared by the scheduler,
//! the event records and the engine.

/// Identifier of the logical actor an event is attributed to.
///
/// Contexts are opaque to the kernel: a node index, a device number or any
/// other integer a consumer chooses. The engine only stores and restores it.
pub type ContextId = u32;

/// Reserved context meaning "no actor" (global work, or code running
/// outside of any event).
pub const NO_CONTEXT: ContextId = u32::MAX;

/// Insertion sequence assigned to every scheduled event.
///
/// Strictly increasing for the lifetime of an engine (it is not reset by
/// `destroy`), so it doubles as the identity of a pending event.
pub type SequenceNumber = u64;

/// Identifier of one engine instance within the process.
pub type EngineId = u64;
