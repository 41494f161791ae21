//! nova-mlops CLI
//!
//! Entry point for the `nova-mlops` command-line tool.

use clap::{Parser, Subcommand};
use nova_mlops::config::{self, CliOverrides, EffectiveConfig, Settings};
use nova_mlops::control_plane::OpenStackCli;
use nova_mlops::launch::{LaunchResult, LaunchSpec, Orchestrator};
use nova_mlops::lifecycle::{self, CleanupOutcome, VolumeCleanup};
use nova_mlops::probe::{self, DEFAULT_LIST_LIMIT};
use nova_mlops::{Backend, Interrupt, JobSpec, OrchestratorError, StateStore};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nova-mlops")]
#[command(about = "Run short-lived compute jobs locally or on OpenStack", version)]
struct Cli {
    /// Path to project config file (default: .nova-mlops/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Directory holding job state records
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// clouds.yaml entry to authenticate with
    #[arg(long, global = true)]
    cloud: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job spec file (TOML; JSON or YAML by .json/.yaml extension)
    Submit {
        /// Job spec file
        file: PathBuf,
    },

    /// Print the state record of a job
    Status {
        /// Job name
        name: String,
    },

    /// Print the effective configuration and where it came from
    Config,

    /// OpenStack backend commands
    Openstack {
        #[command(subcommand)]
        action: OpenstackCommands,
    },
}

#[derive(Subcommand)]
enum OpenstackCommands {
    /// Check authentication and print region, project and user
    Ping,

    /// List available images
    Images {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// List available flavors
    Flavors {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// List available networks
    Networks {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Launch a job instance
    Run {
        /// Job name
        name: String,

        /// Image name (default from config)
        #[arg(long)]
        image: Option<String>,

        /// Flavor name (default from config)
        #[arg(long)]
        flavor: Option<String>,

        /// Network name (default from config)
        #[arg(long)]
        network: Option<String>,

        /// Data volume size in GB; 0 for none
        #[arg(long, allow_negative_numbers = true)]
        volume_gb: Option<i64>,

        /// Data volume name (default: mlops-<name>-results)
        #[arg(long)]
        volume_name: Option<String>,

        /// Keypair to inject
        #[arg(long)]
        key_name: Option<String>,

        /// Security group to apply
        #[arg(long)]
        security_group: Option<String>,
    },

    /// Print the console output of a job's instance
    Logs {
        /// Job name
        name: String,

        /// Only the last N lines
        #[arg(long)]
        lines: Option<u32>,
    },

    /// Delete a job's instance and mark it DELETED
    Cleanup {
        /// Job name
        name: String,

        /// Also delete the data volume
        #[arg(long)]
        delete_volume: bool,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nova_mlops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let interrupt = match Interrupt::install() {
        Ok(interrupt) => interrupt,
        Err(e) => {
            tracing::warn!(error = %e, "could not install interrupt handler");
            Interrupt::new()
        }
    };

    let overrides = CliOverrides {
        state_dir: cli.state_dir.clone(),
        cloud: cli.cloud.clone(),
    };
    let (effective, settings) = match config::load(cli.config.as_deref(), &overrides) {
        Ok(loaded) => loaded,
        Err(e) => fail(&e.into()),
    };
    let store = StateStore::new(&settings.state_dir);

    match cli.command {
        Commands::Submit { file } => {
            run_submit(&file, &settings, &store, interrupt);
        }
        Commands::Status { name } => {
            run_status(&store, &name);
        }
        Commands::Config => {
            run_config(&effective);
        }
        Commands::Openstack { action } => match action {
            OpenstackCommands::Ping => run_ping(&settings),
            OpenstackCommands::Images { limit } => run_images(&settings, limit),
            OpenstackCommands::Flavors { limit } => run_flavors(&settings, limit),
            OpenstackCommands::Networks { limit } => run_networks(&settings, limit),
            OpenstackCommands::Run {
                name,
                image,
                flavor,
                network,
                volume_gb,
                volume_name,
                key_name,
                security_group,
            } => {
                let mut spec = LaunchSpec::new(&name, &settings.openstack);
                if let Some(image) = image {
                    spec.image = image;
                }
                if let Some(flavor) = flavor {
                    spec.flavor = flavor;
                }
                if let Some(network) = network {
                    spec.network = network;
                }
                if volume_gb.is_some() {
                    spec.volume_size_gb = volume_gb;
                }
                spec.volume_name = volume_name;
                spec.key_name = key_name;
                spec.security_group = security_group;
                run_launch(&spec, &settings, &store, interrupt);
            }
            OpenstackCommands::Logs { name, lines } => {
                run_logs(&name, lines, cli.cloud.as_deref(), &settings, &store);
            }
            OpenstackCommands::Cleanup {
                name,
                delete_volume,
            } => {
                run_cleanup(&name, delete_volume, cli.cloud.as_deref(), &settings, &store);
            }
        },
    }
}

/// Print the error and exit with its failure code
fn fail(err: &OrchestratorError) -> ! {
    eprintln!("Error: {}", err);
    process::exit(err.exit_code());
}

fn control_plane(settings: &Settings, cloud: Option<String>) -> OpenStackCli {
    OpenStackCli::new(settings.openstack.cli.clone(), cloud)
}

fn run_submit(path: &Path, settings: &Settings, store: &StateStore, interrupt: Interrupt) {
    let job = match JobSpec::from_file(path) {
        Ok(job) => job,
        Err(e) => fail(&e.into()),
    };

    match job.resources.cloud {
        Backend::Local => match nova_mlops::run_local(&job, store) {
            Ok(code) => {
                let status = if code == 0 { "SUCCEEDED" } else { "FAILED" };
                println!("Job {} {} (returncode {})", job.name, status, code);
                process::exit(code);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(e.exit_code());
            }
        },
        Backend::Openstack => {
            let spec = match LaunchSpec::from_job(&job, &settings.openstack) {
                Ok(spec) => spec,
                Err(e) => fail(&e),
            };
            run_launch(&spec, settings, store, interrupt);
        }
    }
}

fn run_launch(spec: &LaunchSpec, settings: &Settings, store: &StateStore, interrupt: Interrupt) {
    let cp = control_plane(settings, spec.cloud.clone());
    let template = match settings.payload.template() {
        Ok(t) => t,
        Err(e) => fail(&e.into()),
    };

    let result = Orchestrator::new(&cp, &template, store)
        .with_settings(settings)
        .map(|o| o.with_interrupt(interrupt))
        .and_then(|o| o.launch(spec));

    match result {
        Ok(launched) => print_launch(&launched),
        Err(e) => fail(&e),
    }
}

fn print_launch(launched: &LaunchResult) {
    match serde_json::to_string_pretty(launched) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_status(store: &StateStore, name: &str) {
    let state = match lifecycle::status(store, name) {
        Ok(state) => state,
        Err(e) => fail(&e),
    };
    match state.to_json_pretty() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_config(effective: &EffectiveConfig) {
    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_ping(settings: &Settings) {
    let cp = control_plane(settings, settings.openstack.cloud.clone());
    match probe::ping(&cp) {
        Ok(summary) => {
            println!("Authenticated");
            println!();
            println!("  Region:  {}", summary.region.as_deref().unwrap_or("-"));
            println!("  Project: {}", summary.project_id.as_deref().unwrap_or("-"));
            println!("  User:    {}", summary.user_id.as_deref().unwrap_or("-"));
        }
        Err(e) => fail(&e),
    }
}

fn run_images(settings: &Settings, limit: usize) {
    let cp = control_plane(settings, settings.openstack.cloud.clone());
    match probe::images(&cp, limit) {
        Ok(images) => println!("{}", probe::render_images(&images)),
        Err(e) => fail(&e),
    }
}

fn run_flavors(settings: &Settings, limit: usize) {
    let cp = control_plane(settings, settings.openstack.cloud.clone());
    match probe::flavors(&cp, limit) {
        Ok(flavors) => println!("{}", probe::render_flavors(&flavors)),
        Err(e) => fail(&e),
    }
}

fn run_networks(settings: &Settings, limit: usize) {
    let cp = control_plane(settings, settings.openstack.cloud.clone());
    match probe::networks(&cp, limit) {
        Ok(networks) => println!("{}", probe::render_networks(&networks)),
        Err(e) => fail(&e),
    }
}

fn run_logs(
    name: &str,
    lines: Option<u32>,
    cloud_flag: Option<&str>,
    settings: &Settings,
    store: &StateStore,
) {
    let state = match lifecycle::status(store, name) {
        Ok(state) => state,
        Err(e) => fail(&e),
    };
    let cloud = lifecycle::select_cloud(
        cloud_flag,
        Some(&state),
        settings.openstack.cloud.as_deref(),
    );
    let cp = control_plane(settings, cloud);

    match lifecycle::logs(store, &cp, name, lines) {
        Ok(text) => println!("{}", text),
        Err(e) => fail(&e),
    }
}

fn run_cleanup(
    name: &str,
    delete_volume: bool,
    cloud_flag: Option<&str>,
    settings: &Settings,
    store: &StateStore,
) {
    let state = match store.read(name) {
        Ok(state) => state,
        Err(e) => fail(&e.into()),
    };
    let cloud = lifecycle::select_cloud(
        cloud_flag,
        state.as_ref(),
        settings.openstack.cloud.as_deref(),
    );
    let cp = control_plane(settings, cloud);

    match lifecycle::cleanup(store, &cp, name, delete_volume) {
        Ok(CleanupOutcome::NothingToClean) => {
            println!("Nothing to clean for job {}", name);
        }
        Ok(CleanupOutcome::Deleted {
            server_id,
            already_gone,
            volume,
        }) => {
            if already_gone {
                println!("Server {} was already gone", server_id);
            } else {
                println!("Deleted server {}", server_id);
            }
            match volume {
                VolumeCleanup::None => {}
                VolumeCleanup::Kept { id } => {
                    println!("Kept volume {} (use --delete-volume to remove it)", id)
                }
                VolumeCleanup::Deleted { id } => println!("Deleted volume {}", id),
                VolumeCleanup::Failed { id, reason } => {
                    println!("Could not delete volume {}: {}", id, reason)
                }
            }
            println!("Job {} marked DELETED", name);
        }
        Err(e) => fail(&e),
    }
}
