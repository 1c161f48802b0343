use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use flotilla_cluster::detector::{MasterDetector, MasterUrl};
use flotilla_cluster::launcher::NullLauncher;
use flotilla_cluster::local::LocalCluster;
use flotilla_cluster::master::{MasterActor, MasterEvent, MasterOptions};
use flotilla_cluster::slave::{SlaveActor, SlaveEvent, SlaveOptions};
use flotilla_cluster::state::State;
use flotilla_common::config::{AppConfig, ConfigKeyValue, ConfigLoadOptions};
use flotilla_server::actor::ActorSystem;
use log::info;

#[derive(Parser)]
#[command(name = "flotilla", version, about = "A two-level cluster resource manager")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// Directory containing a `flotilla.conf` configuration file.
    #[arg(long, value_name = "DIR")]
    conf: Option<PathBuf>,
    /// Configuration overrides, e.g. `-o master.port=5051`.
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
    /// Only log errors.
    #[arg(long, overrides_with = "no_quiet")]
    quiet: bool,
    /// Negate a `quiet` setting from the environment or a config file.
    #[arg(long = "no-quiet")]
    no_quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the cluster master.
    Master {
        #[command(flatten)]
        common: CommonArgs,
        /// The address to announce the master under.
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a worker node.
    Slave {
        #[command(flatten)]
        common: CommonArgs,
        /// The master discovery URL, e.g. `flotilla://host:5050` or
        /// `zk://host1:2181,host2:2181/flotilla`.
        #[arg(long)]
        master: String,
        /// The total resources of this slave, e.g. `cpus:8;mem:16384`.
        #[arg(long)]
        resources: Option<String>,
    },
    /// Run an in-process cluster with a master and a number of slaves.
    Local {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, default_value_t = 1)]
        num_slaves: usize,
    },
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    match cli.command {
        Command::Master { common, ip, port } => {
            let mut overrides = vec![];
            if let Some(ip) = ip {
                overrides.push(key_value("master.hostname", ip));
            }
            if let Some(port) = port {
                overrides.push(key_value("master.port", port.to_string()));
            }
            let config = load_config(&common, overrides)?;
            run_master(config)
        }
        Command::Slave {
            common,
            master,
            resources,
        } => {
            let mut overrides = vec![];
            if let Some(resources) = resources {
                overrides.push(key_value("slave.resources", resources));
            }
            let config = load_config(&common, overrides)?;
            let master = master.parse::<MasterUrl>()?;
            run_slave(config, master)
        }
        Command::Local { common, num_slaves } => {
            let config = load_config(&common, vec![])?;
            run_local(config, num_slaves)
        }
    }
}

fn key_value(key: &str, value: String) -> ConfigKeyValue {
    ConfigKeyValue {
        key: key.to_string(),
        value: Some(value),
    }
}

/// Assemble the configuration layers: defaults, then the `--conf` file,
/// then the environment, then command-line overrides.
fn load_config(
    common: &CommonArgs,
    mut overrides: Vec<ConfigKeyValue>,
) -> Result<AppConfig, Box<dyn Error>> {
    for option in &common.options {
        let Some((key, value)) = option.split_once('=') else {
            usage_error(format!("expecting KEY=VALUE in override '{option}'"));
        };
        overrides.push(key_value(key.trim(), value.trim().to_string()));
    }
    if common.quiet {
        overrides.push(key_value("logging.quiet", "true".to_string()));
    } else if common.no_quiet {
        overrides.push(key_value("logging.quiet", "false".to_string()));
    }
    let config = AppConfig::load(ConfigLoadOptions {
        conf_dir: common.conf.clone(),
        overrides,
    });
    match config {
        Ok(config) => {
            init_logging(&config);
            Ok(config)
        }
        Err(e) => usage_error(e.to_string()),
    }
}

fn usage_error(message: String) -> ! {
    eprintln!("Error: {message}");
    eprintln!("{}", Cli::command().render_usage());
    std::process::exit(1);
}

fn init_logging(config: &AppConfig) {
    let filter = if config.logging.quiet {
        "error"
    } else {
        &config.logging.level
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .try_init()
        .ok();
}

fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn Error>> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn run_master(config: AppConfig) -> Result<(), Box<dyn Error>> {
    runtime()?.block_on(async move {
        let mut system = ActorSystem::new();
        let options = MasterOptions::try_new(&config)?.with_registry(State::in_memory());
        let master = system.spawn::<MasterActor>(options);
        tokio::signal::ctrl_c().await?;
        info!("shutting down the master");
        let _ = master.send(MasterEvent::Shutdown);
        system.join().await;
        Ok(())
    })
}

fn run_slave(config: AppConfig, master: MasterUrl) -> Result<(), Box<dyn Error>> {
    if master == MasterUrl::Local {
        usage_error("a local master is launched with the 'local' subcommand".to_string());
    }
    runtime()?.block_on(async move {
        let mut system = ActorSystem::new();
        // Master detection integration (e.g. a ZooKeeper election) appoints
        // masters on this detector; until then the slave waits.
        let detector = MasterDetector::new();
        info!("waiting for master detection at {master}");
        let options = SlaveOptions::try_new(&config, detector, Arc::new(NullLauncher))?;
        let slave = system.spawn::<SlaveActor>(options);
        tokio::signal::ctrl_c().await?;
        info!("shutting down the slave");
        let _ = slave.send(SlaveEvent::Shutdown);
        system.join().await;
        Ok(())
    })
}

fn run_local(config: AppConfig, num_slaves: usize) -> Result<(), Box<dyn Error>> {
    runtime()?.block_on(async move {
        let mut system = ActorSystem::new();
        let cluster = LocalCluster::launch(&mut system, &config, num_slaves, Arc::new(NullLauncher))?;
        info!("local cluster is up with {num_slaves} slaves");
        tokio::signal::ctrl_c().await?;
        info!("shutting down the local cluster");
        cluster.shutdown();
        system.join().await;
        Ok(())
    })
}
