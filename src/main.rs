use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use host_probe::{HostFacts, SystemRunner};
use lab_installer::{
    AcceptDefaults, AnswerFile, Artifacts, EnvSnapshot, InstallLayout, InstallOptions, InstallStatus,
    Installer, LayoutOverrides, Prompter, Resolver, TerminalPrompter,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "labpi-setup")]
#[command(about = "Provision a Raspberry Pi as a Virtual Lab \"Lab Pi\" node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or update the node (default)
    Install(InstallArgs),
    /// Print the environment file and unit that would be written
    Render(TargetArgs),
    /// Show the state of an existing installation
    Status {
        #[command(flatten)]
        target: TargetArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Default)]
struct TargetArgs {
    /// TOML file with pre-answered configuration values
    #[arg(long, value_name = "FILE")]
    answers: Option<PathBuf>,

    /// Account the service runs as (defaults to the sudo caller)
    #[arg(long, value_name = "NAME")]
    user: Option<String>,

    /// Checkout location (defaults to ~/virtual-lab of the target user)
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,
}

#[derive(Args, Default)]
struct InstallArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Accept defaults and skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Repository to clone the node application from
    #[arg(long, value_name = "URL")]
    repo_url: Option<String>,

    /// UPS HAT installer script to run on Raspberry Pi hardware
    #[arg(long, value_name = "FILE")]
    ups_script: Option<PathBuf>,

    /// Do not install system packages
    #[arg(long)]
    skip_packages: bool,

    /// Do not run the UPS HAT installer
    #[arg(long)]
    skip_ups: bool,

    /// Refuse to write an empty node id or experiment id
    #[arg(long)]
    strict: bool,
}

impl TargetArgs {
    async fn answers(&self) -> Result<AnswerFile> {
        Ok(match &self.answers {
            Some(path) => AnswerFile::load(path).await?,
            None => AnswerFile::default(),
        })
    }

    fn overrides(&self) -> LayoutOverrides {
        LayoutOverrides {
            user: self.user.clone(),
            project_dir: self.project_dir.clone(),
            ..LayoutOverrides::default()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with user's verbosity preference; RUST_LOG wins
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "labpi_setup={0},lab_installer={0},host_probe={0}",
            log_level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let runner = SystemRunner::new();
    let env = EnvSnapshot::capture();

    match cli.command.unwrap_or_else(|| Commands::Install(InstallArgs::default())) {
        Commands::Install(args) => install(&runner, env, args).await?,
        Commands::Render(target) => render(&runner, env, target).await?,
        Commands::Status { target, json } => {
            let answers = target.answers().await?;
            let layout = InstallLayout::resolve(&runner, &env, &answers, &target.overrides()).await?;
            let status = InstallStatus::collect(&runner, &layout).await?;
            if json {
                println!("{}", status.to_json()?);
            } else {
                status.print();
            }
        }
    }

    Ok(())
}

async fn install(runner: &SystemRunner, env: EnvSnapshot, args: InstallArgs) -> Result<()> {
    let answers = args.target.answers().await?;

    let interactive = !args.yes && std::io::stdin().is_terminal();
    let prompter: &dyn Prompter = if interactive { &TerminalPrompter } else { &AcceptDefaults };
    if !interactive && !args.yes {
        info!("No terminal attached, accepting defaults for unset values");
    }

    let overrides = LayoutOverrides {
        repo_url: args.repo_url.clone(),
        ups_script: args.ups_script.clone(),
        ..args.target.overrides()
    };
    let options = InstallOptions {
        assume_yes: args.yes,
        skip_packages: args.skip_packages,
        skip_ups: args.skip_ups,
        strict: args.strict,
    };

    let installer = Installer::new(runner, prompter)
        .with_env(env)
        .with_answers(answers)
        .with_overrides(overrides)
        .with_options(options);

    if let Err(e) = installer.install().await {
        error!("Installation failed during the {} stage: {:#}", e.stage, e.source);
        std::process::exit(1);
    }

    Ok(())
}

/// Resolve configuration without prompting and print both artifacts.
async fn render(runner: &SystemRunner, env: EnvSnapshot, target: TargetArgs) -> Result<()> {
    let answers = target.answers().await?;
    let layout = InstallLayout::resolve(runner, &env, &answers, &target.overrides()).await?;
    let facts = HostFacts::gather(&layout.host_root, runner).await;
    let config = Resolver::new(&env, &answers, &facts).resolve(&AcceptDefaults)?;

    let artifacts = Artifacts::render(&config, &layout);
    println!("# {}", layout.env_file().display());
    print!("{}", artifacts.env_file);
    println!();
    println!("# {}", layout.unit_path().display());
    print!("{}", artifacts.unit);

    Ok(())
}
