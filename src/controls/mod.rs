//! Control tree model.
//!
//! A snapshot of the form's controls as the client sees them. Snapshots are
//! built outside this crate, compared by [`crate::diff`] and never mutated.

pub mod ids;
mod itemset;
mod model;
mod static_state;

pub use itemset::{Item, Itemset};
pub use model::{Control, ControlKind, Lhha, Mips, ValueState};
pub use static_state::{ItemsInfo, StaticState};
