mod cli;
mod ui;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use transferjob::StoreError;
use transferjob::clock::SystemClock;
use transferjob::config::TransferJobConfig;
use transferjob::state_machine::{
    AuthField, AuthorizationFields, Job, Stage, TransitionPolicy, advance_with,
};
use transferjob::store::{FileJobStore, InMemoryJobStore, JobStore};
use ui::Printer;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let printer = Printer::default();

    let config = match TransferJobConfig::load() {
        Ok(config) => config,
        Err(err) => {
            printer.rejected(&format!("config: {err:#}"));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(cli.verbose, &config.log_level);

    match run(cli, &config, &printer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            printer.rejected(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, default_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, config: &TransferJobConfig, printer: &Printer) -> Result<()> {
    let policy = if cli.forward_only {
        TransitionPolicy::ForwardOnly
    } else {
        config.policy()
    };
    let store_path = cli.store.unwrap_or_else(|| config.store_path.clone());
    let clock = SystemClock;

    match cli.command {
        Command::Create {
            export_service,
            import_service,
            data_type,
        } => {
            let store = FileJobStore::open(store_path);
            let job = Job::create(export_service, import_service, data_type, &clock);
            let id = store.create(&job)?;
            printer.created(id);
        }
        Command::Show { id } => {
            let store = FileJobStore::open(store_path);
            let entries = store.get(id)?.ok_or(StoreError::NotFound(id))?;
            printer.record(&entries)?;
            printer.job(&Job::from_map(&entries, &clock)?);
        }
        Command::Advance { id, args } => {
            let store = FileJobStore::open(store_path);
            let read = store.load_snapshot(id, &clock)?;
            let next = advance_with(&read.job, args.to_fields(), policy, &clock)?;
            store.save_transition(id, &read.record, &next)?;
            printer.advanced(id, &next);
        }
        Command::Demo => demo(policy, printer)?,
    }
    Ok(())
}

/// Walks a fresh in-memory job through the whole handshake with placeholder
/// artifacts standing in for real ciphertext.
fn demo(policy: TransitionPolicy, printer: &Printer) -> Result<()> {
    let clock = SystemClock;
    let store = InMemoryJobStore::new();
    let mut job = Job::create("SOURCE_SERVICE", "DESTINATION_SERVICE", "PHOTOS", &clock);
    let id = store.create(&job)?;
    let mut record = job.to_map();
    info!(%id, "demo job created");

    let sealed = |field: AuthField| format!("sealed:{}", field.name());
    let steps = [
        (Stage::Initial, &[AuthField::SessionKey][..]),
        (Stage::CredsAvailable, &[AuthField::SessionKey][..]),
        (
            Stage::CredsEncryptionKeyGenerated,
            &[AuthField::SessionKey, AuthField::PublicKey, AuthField::PrivateKey][..],
        ),
        (Stage::CredsEncrypted, &AuthField::ALL[..]),
    ];

    for (stage, populated) in steps {
        let next = populated
            .iter()
            .fold(AuthorizationFields::new(stage), |fields, &f| {
                fields.with(f, sealed(f))
            });
        job = advance_with(&job, next, policy, &clock)?;
        store.save_transition(id, &record, &job)?;
        record = job.to_map();
        printer.advanced(id, &job);
    }

    // A worker that skips key generation is refused.
    let premature = AuthorizationFields::new(Stage::CredsEncryptionKeyGenerated)
        .with(AuthField::SessionKey, sealed(AuthField::SessionKey));
    if let Err(err) = advance_with(&job, premature, policy, &clock) {
        printer.rejected(&err.to_string());
    }

    if let Some(entries) = store.get(id)? {
        printer.record(&entries)?;
    }
    printer.job(&job);
    Ok(())
}
