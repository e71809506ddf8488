//! Concrete chart definitions
//!
//! Each chart supplies a payload schema, the seeding rule (`template`), and
//! typed update entry points translating domain events into deltas.

pub mod federation;
pub mod per_user_drive;
pub mod per_user_notes;

pub use federation::{FederationChart, FederationPayload};
pub use per_user_drive::{PerUserDriveChart, PerUserDrivePayload};
pub use per_user_notes::{NoteDiffs, NoteKind, PerUserNotesChart, PerUserNotesPayload};
