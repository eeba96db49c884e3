//! Translation runs
//!
//! Each hotkey trigger becomes one run: snapshot the clipboard, copy the
//! selection, translate it, paste the result over the selection and put the
//! clipboard back.

mod gate;
mod run;
mod settle;

#[cfg(test)]
pub(crate) mod testing;

pub use run::{Orchestrator, RunStatsSnapshot};
