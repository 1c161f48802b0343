use std::sync::Arc;

use flotilla_common::config::AppConfig;
use flotilla_server::actor::{ActorHandle, ActorSystem};

use crate::detector::{MasterDetector, MasterRef};
use crate::error::ClusterResult;
use crate::launcher::ExecutorLauncher;
use crate::master::{MasterActor, MasterEvent, MasterOptions};
use crate::slave::{SlaveActor, SlaveEvent, SlaveOptions};
use crate::state::State;

/// An in-process cluster: one master and a number of slaves sharing a
/// detector. Used by the `local` subcommand and the test suites.
pub struct LocalCluster {
    pub detector: MasterDetector,
    pub master: ActorHandle<MasterActor>,
    pub slaves: Vec<ActorHandle<SlaveActor>>,
}

impl LocalCluster {
    /// Spawn a master and `num_slaves` slaves and appoint the master on a
    /// fresh detector.
    pub fn launch(
        system: &mut ActorSystem,
        config: &AppConfig,
        num_slaves: usize,
        launcher: Arc<dyn ExecutorLauncher>,
    ) -> ClusterResult<Self> {
        let detector = MasterDetector::new();
        let options = MasterOptions::try_new(config)?.with_registry(State::in_memory());
        let info = options.info.clone();
        let master = system.spawn::<MasterActor>(options);
        detector.appoint(Some(MasterRef {
            info,
            handle: master.clone(),
        }));

        let mut slaves = vec![];
        for i in 0..num_slaves {
            let mut config = config.clone();
            if num_slaves > 1 {
                config.slave.hostname = format!("{}-{i}", config.slave.hostname);
            }
            let options = SlaveOptions::try_new(&config, detector.clone(), launcher.clone())?;
            slaves.push(system.spawn::<SlaveActor>(options));
        }
        Ok(Self {
            detector,
            master,
            slaves,
        })
    }

    /// Ask every actor in the cluster to stop.
    pub fn shutdown(&self) {
        for slave in &self.slaves {
            let _ = slave.send(SlaveEvent::Shutdown);
        }
        let _ = self.master.send(MasterEvent::Shutdown);
        self.detector.appoint(None);
    }
}
