mod key;
mod state;
mod stats;

pub use key::SlotKey;
pub(crate) use state::DelayGate;
pub use state::{PauseUnit, SlotState, Window};
pub use stats::{SlotStats, SlotStatsMap};
