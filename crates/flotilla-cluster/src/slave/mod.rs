mod actor;
mod event;
mod options;
mod state;

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use flotilla_server::actor::ActorHandle;

pub use actor::SlaveActor;
pub use event::{SlaveEvent, SlaveSnapshot};
pub use options::SlaveOptions;

static SLAVE_PIDS: OnceLock<Mutex<HashMap<String, ActorHandle<SlaveActor>>>> = OnceLock::new();

fn slave_pids() -> &'static Mutex<HashMap<String, ActorHandle<SlaveActor>>> {
    SLAVE_PIDS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a slave handle under its pid string so that executor drivers
/// in the same process can bootstrap from the environment.
pub(crate) fn register_slave_pid(pid: &str, handle: ActorHandle<SlaveActor>) {
    if let Ok(mut pids) = slave_pids().lock() {
        pids.insert(pid.to_string(), handle);
    }
}

pub(crate) fn unregister_slave_pid(pid: &str) {
    if let Ok(mut pids) = slave_pids().lock() {
        pids.remove(pid);
    }
}

/// Resolve a slave pid string to its handle, if the slave runs in this
/// process.
pub fn lookup_slave_pid(pid: &str) -> Option<ActorHandle<SlaveActor>> {
    slave_pids().lock().ok()?.get(pid).cloned()
}
