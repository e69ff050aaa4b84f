use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use medrec::cli::{open_store, Session, SessionPaths};
use medrec::{DeploymentProfile, StoreConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Patient record manager", long_about = None)]
struct Args {
    /// Binary record file loaded at startup and written by 'save'
    #[clap(long, default_value = "patients.dat")]
    data_file: PathBuf,

    #[clap(long, default_value = "patients.txt")]
    report_file: PathBuf,

    #[clap(long, default_value = "patients.json")]
    json_file: PathBuf,

    /// compact = 50 patients, standard = 100
    #[clap(long, value_enum, default_value_t = DeploymentProfile::Compact)]
    profile: DeploymentProfile,

    #[clap(long, default_value_t = StoreConfig::DEFAULT_INITIAL_CAPACITY)]
    initial_capacity: usize,

    /// Save on exit without asking
    #[clap(long)]
    save_on_exit: bool,

    /// Load nothing from a damaged record file instead of keeping the
    /// readable records; the file is not overwritten without confirmation
    #[clap(long)]
    strict_load: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .with_target(false)
    .with_level(true)
    .init();

    let args = Args::parse();
    let config = StoreConfig::new(args.profile, args.initial_capacity);

    println!("--- Patient Records ---");
    println!("Profile: {} (max {} patients)", args.profile, config.max_capacity);
    println!("Data file: {}", args.data_file.display());
    println!("-----------------------");

    let opened = match open_store(&args.data_file, config, args.strict_load) {
        Ok(opened) => opened,
        Err(e) => {
            error!(error = %e, "could not initialize record store");
            eprintln!("Fatal: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("{}", opened.notice);

    let paths = SessionPaths {
        data_file: args.data_file.clone(),
        report_file: args.report_file.clone(),
        json_file: args.json_file.clone(),
    };

    let stdin = io::stdin();
    let mut session = Session::new(opened.store, paths, stdin.lock(), io::stdout())
    .protect_data_file(opened.protect_data_file)
    .save_on_exit(args.save_on_exit);

    match session.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "terminal i/o failed");
            ExitCode::FAILURE
        }
    }
}
