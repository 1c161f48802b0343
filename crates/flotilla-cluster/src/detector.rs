use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use flotilla_server::actor::ActorHandle;
use tokio::sync::watch;

use crate::error::ClusterError;
use crate::info::MasterInfo;
use crate::master::MasterActor;

/// A reference to the current leading master.
#[derive(Debug, Clone)]
pub struct MasterRef {
    pub info: MasterInfo,
    pub handle: ActorHandle<MasterActor>,
}

/// The leader-detection observable shared by scheduler drivers and slaves.
///
/// Appointments happen in whichever context owns the detector (a standalone
/// launcher, a test, or an external election integration); observers learn
/// about them through message delivery on their own actors.
#[derive(Clone)]
pub struct MasterDetector {
    appointed: Arc<watch::Sender<Option<MasterRef>>>,
}

impl Default for MasterDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterDetector {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            appointed: Arc::new(tx),
        }
    }

    /// Announce a new leading master, or the absence of one.
    pub fn appoint(&self, master: Option<MasterRef>) {
        self.appointed.send_replace(master);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<MasterRef>> {
        self.appointed.subscribe()
    }

    pub fn current(&self) -> Option<MasterRef> {
        self.appointed.borrow().clone()
    }
}

/// A parsed master discovery address.
///
/// The ZooKeeper form parses but is not wired to an election integration
/// here; using it reports a configuration error at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterUrl {
    /// An in-process cluster, as used by tests and the `local` subcommand.
    Local,
    /// A single master at a fixed address.
    Direct { host: String, port: u16 },
    /// A ZooKeeper ensemble for leader election.
    ZooKeeper {
        credentials: Option<(String, String)>,
        servers: Vec<(String, u16)>,
        path: String,
    },
}

impl FromStr for MasterUrl {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ClusterError::InvalidArgument(format!("{message}: '{s}'"));
        if s == "local" {
            return Ok(MasterUrl::Local);
        }
        if let Some(rest) = s.strip_prefix("zk://") {
            let (credentials, rest) = match rest.split_once('@') {
                Some((auth, rest)) => {
                    let (user, password) = auth
                        .split_once(':')
                        .ok_or_else(|| invalid("expecting 'user:password' in master URL"))?;
                    (Some((user.to_string(), password.to_string())), rest)
                }
                None => (None, rest),
            };
            let (servers, path) = rest
                .split_once('/')
                .ok_or_else(|| invalid("expecting a znode path in master URL"))?;
            let servers = servers
                .split(',')
                .map(|server| parse_host_port(server).ok_or_else(|| invalid("invalid server")))
                .collect::<Result<Vec<_>, _>>()?;
            if servers.is_empty() {
                return Err(invalid("expecting at least one server in master URL"));
            }
            return Ok(MasterUrl::ZooKeeper {
                credentials,
                servers,
                path: format!("/{path}"),
            });
        }
        let rest = s.strip_prefix("flotilla://").unwrap_or(s);
        match parse_host_port(rest) {
            Some((host, port)) => Ok(MasterUrl::Direct { host, port }),
            None => Err(invalid("expecting 'host:port' in master URL")),
        }
    }
}

fn parse_host_port(s: &str) -> Option<(String, u16)> {
    let (host, port) = s.trim().split_once(':')?;
    let port = port.parse::<u16>().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

impl fmt::Display for MasterUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterUrl::Local => write!(f, "local"),
            MasterUrl::Direct { host, port } => write!(f, "flotilla://{host}:{port}"),
            MasterUrl::ZooKeeper {
                credentials,
                servers,
                path,
            } => {
                write!(f, "zk://")?;
                if let Some((user, password)) = credentials {
                    write!(f, "{user}:{password}@")?;
                }
                for (i, (host, port)) in servers.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{host}:{port}")?;
                }
                write!(f, "{path}")
            }
        }
    }
}
