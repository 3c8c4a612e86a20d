use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use roadie::config::{self, DeployConfig};
use roadie::deploy::Deployer;
use roadie::package;
use roadie::pipeline::StepOutcome;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "roadie")]
#[command(version = VERSION)]
#[command(about = "CLI for packaging, publishing, and provisioning deployment pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full deployment pipeline
    Deploy(DeployArgs),
    /// Build package archives without deploying
    Package(PackageArgs),
}

#[derive(Args)]
struct DeployArgs {
    /// Path to the deployment configuration file
    #[arg(long, short)]
    config: PathBuf,

    /// Provider credential profile (overrides the configured profile)
    #[arg(long)]
    profile: Option<String>,
}

#[derive(Args)]
struct PackageArgs {
    /// Path to the deployment configuration file
    #[arg(long, short)]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy(args) => run_deploy(args),
        Commands::Package(args) => run_package(args),
    }
}

fn run_deploy(args: DeployArgs) -> ExitCode {
    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(code) => return code,
    };
    if let Some(profile) = args.profile {
        config.profile = Some(profile);
    }

    let mut deployer = Deployer::new(config);
    match deployer.run() {
        StepOutcome::Failed => ExitCode::from(1),
        _ => ExitCode::SUCCESS,
    }
}

fn run_package(args: PackageArgs) -> ExitCode {
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let source_root = Path::new(&config.source_path);
    for spec in &config.packages {
        let archive_path = Path::new(&spec.name);
        let result = package::build_package(
            archive_path,
            source_root,
            &spec.source_dirs_to_exclude,
            spec.add_init_at_root,
        )
        .and_then(|_| match &config.lib_path {
            Some(lib_path) => package::merge_library_archives(
                archive_path,
                Path::new(lib_path),
                &spec.libs_to_exclude,
                &spec.libs_to_include,
            ),
            None => Ok(()),
        });

        match result {
            Ok(()) => eprintln!("[package] Created '{}'", spec.name),
            Err(err) => {
                eprintln!("roadie: {}: {}", err.code(), err);
                return ExitCode::from(1);
            }
        }
    }
    ExitCode::SUCCESS
}

fn load_config(path: &Path) -> Result<DeployConfig, ExitCode> {
    config::load(path).map_err(|err| {
        eprintln!("roadie: {}: {}", err.code(), err);
        ExitCode::from(2)
    })
}
