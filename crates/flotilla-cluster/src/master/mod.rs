mod actor;
mod event;
mod options;
mod state;

pub use actor::MasterActor;
pub use event::{
    FrameworkSnapshot, MasterEvent, MasterSnapshot, RunningTask, SlaveSnapshot,
};
pub use options::MasterOptions;
pub use state::{RosterEntry, SlaveRoster};
