use clap::{Parser, Subcommand};
use lab_core::{
    config::{
        bool_from_env_value, enabled_processes_from_env_value, store_backend_from_env_value,
    },
    constants::DEFAULT_DATA_DIR,
    CoreConfig, ExternalRef, ProcessCommand, ProcessDraft, ProcessKind, ProcessPatch, RecordId,
    SampleAction, SampleType, WorkflowError, WorkflowResult, WorkflowService,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "labwf")]
#[command(about = "Lab sample workflow CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample lifecycle
    #[command(subcommand)]
    Sample(SampleCommand),
    /// Analysis processes
    #[command(subcommand)]
    Process(ProcessCmd),
    /// Lab test orders
    #[command(subcommand)]
    Order(OrderCommand),
}

#[derive(Subcommand)]
enum SampleCommand {
    /// Create the workflow sample for a lab test order
    Create {
        /// Lab test order reference
        order: String,
        /// Sample type code (default: blood)
        #[arg(long)]
        sample_type: Option<String>,
        /// Origin institution reference (defaults to the order's)
        #[arg(long)]
        origin: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Apply an action: collect, dispatch, receive, process, complete, auto_complete, reject
    Advance { sample_id: String, action: String },
    /// List samples, newest first
    List,
    /// Show a sample with its processes
    Show { sample_id: String },
    /// Whether every process of the sample is closed
    Completion { sample_id: String },
    /// Delete a sample and its processes
    Delete { sample_id: String },
}

#[derive(Subcommand)]
enum ProcessCmd {
    /// Create an analysis process for a sample
    Create {
        sample_id: String,
        /// molecular, histopathology or immunoassay
        kind: String,
        /// Creation fields as a JSON object
        #[arg(long, default_value = "{}")]
        json: String,
    },
    /// Apply a process action, optionally patching fields first
    Advance {
        process_id: String,
        kind: String,
        action: String,
        /// Field changes as a JSON object
        #[arg(long)]
        patch: Option<String>,
    },
    /// Change fields of an open process
    Update {
        process_id: String,
        kind: String,
        /// Field changes as a JSON object
        json: String,
    },
    /// Show a process record
    Show { process_id: String, kind: String },
}

#[derive(Subcommand)]
enum OrderCommand {
    /// State of the sample attached to an order
    SampleState { order: String },
    /// Delete the samples (and their processes) of an order
    DeleteSamples { order: String },
}

fn config_from_env() -> WorkflowResult<CoreConfig> {
    let data_dir = std::env::var("LAB_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let orders_file = std::env::var("LAB_ORDERS_FILE").ok().map(PathBuf::from);
    let enabled = enabled_processes_from_env_value(std::env::var("LAB_ENABLED_PROCESSES").ok())?;
    let auto_complete =
        bool_from_env_value("LAB_AUTO_COMPLETE", std::env::var("LAB_AUTO_COMPLETE").ok(), false)?;
    let backend = store_backend_from_env_value(std::env::var("LAB_STORE").ok())?;

    CoreConfig::new(
        PathBuf::from(data_dir),
        orders_file,
        backend,
        enabled,
        auto_complete,
    )
}

fn parse_json(raw: &str) -> WorkflowResult<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| WorkflowError::InvalidInput(format!("invalid JSON: {e}")))
}

fn print_json<T: serde::Serialize>(value: &T) -> WorkflowResult<()> {
    let out = serde_json::to_string_pretty(value).map_err(WorkflowError::Serialization)?;
    println!("{}", out);
    Ok(())
}

fn run(command: Commands, service: &WorkflowService) -> WorkflowResult<()> {
    match command {
        Commands::Sample(cmd) => match cmd {
            SampleCommand::Create {
                order,
                sample_type,
                origin,
                notes,
            } => {
                let sample_type = match sample_type {
                    Some(code) => code.parse()?,
                    None => SampleType::default(),
                };
                let origin = origin.map(ExternalRef::new).transpose()?;
                let sample =
                    service.create_sample(&ExternalRef::new(&order)?, sample_type, origin, notes)?;
                println!(
                    "Created sample {} for order {} ({})",
                    lab_core::repositories::Record::id(&sample),
                    order,
                    sample.state().label()
                );
            }
            SampleCommand::Advance { sample_id, action } => {
                let action: SampleAction = action.parse()?;
                let sample = service.advance_sample(RecordId::parse(&sample_id)?, action)?;
                println!("Sample {} is now {}", sample_id, sample.state());
            }
            SampleCommand::List => {
                let samples = service.list_samples()?;
                if samples.is_empty() {
                    println!("No samples found.");
                }
                for sample in samples {
                    println!(
                        "ID: {}, Order: {}, Type: {}, State: {}, Created: {}",
                        lab_core::repositories::Record::id(&sample),
                        sample.lab_test(),
                        sample.sample_type.label(),
                        sample.state().label(),
                        sample.created_at()
                    );
                }
            }
            SampleCommand::Show { sample_id } => {
                print_json(&service.sample_overview(RecordId::parse(&sample_id)?)?)?;
            }
            SampleCommand::Completion { sample_id } => {
                let done = service.query_completion(RecordId::parse(&sample_id)?)?;
                println!("{}", done);
            }
            SampleCommand::Delete { sample_id } => {
                let removed = service.delete_sample(RecordId::parse(&sample_id)?)?;
                println!("Deleted sample {} and {} process(es)", sample_id, removed);
            }
        },
        Commands::Process(cmd) => match cmd {
            ProcessCmd::Create {
                sample_id,
                kind,
                json,
            } => {
                let kind: ProcessKind = kind.parse()?;
                let draft = ProcessDraft::from_json(kind, parse_json(&json)?)?;
                let summary = service.create_process(RecordId::parse(&sample_id)?, draft)?;
                println!(
                    "Created {} process {} ({})",
                    summary.kind, summary.id, summary.state
                );
            }
            ProcessCmd::Advance {
                process_id,
                kind,
                action,
                patch,
            } => {
                let patch = patch.as_deref().map(parse_json).transpose()?;
                let command = ProcessCommand::parse(kind.parse()?, &action, patch)?;
                let record = service.advance(RecordId::parse(&process_id)?, command)?;
                println!("Process {} is now {}", process_id, record.summary().state);
            }
            ProcessCmd::Update {
                process_id,
                kind,
                json,
            } => {
                let patch = ProcessPatch::from_json(kind.parse()?, parse_json(&json)?)?;
                print_json(&service.update_process(RecordId::parse(&process_id)?, patch)?)?;
            }
            ProcessCmd::Show { process_id, kind } => {
                print_json(&service.get_process(kind.parse()?, RecordId::parse(&process_id)?)?)?;
            }
        },
        Commands::Order(cmd) => match cmd {
            OrderCommand::SampleState { order } => {
                match service.order_sample_state(&ExternalRef::new(&order)?)? {
                    Some(state) => println!("{}", state),
                    None => println!("no_sample"),
                }
            }
            OrderCommand::DeleteSamples { order } => {
                let removed = service.delete_samples_for_order(&ExternalRef::new(&order)?)?;
                println!("Deleted {} sample(s) for order {}", removed, order);
            }
        },
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lab_core=warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let service = match config_from_env()
        .and_then(|cfg| WorkflowService::from_config(Arc::new(cfg)))
    {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, &service) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_process_advance_with_patch() {
        let cli = Cli::try_parse_from([
            "labwf",
            "process",
            "advance",
            "0123456789abcdef0123456789abcdef",
            "histopathology",
            "complete_macroscopy",
            "--patch",
            r#"{"number_of_cuts": 2}"#,
        ])
        .unwrap();
        match cli.command {
            Commands::Process(ProcessCmd::Advance { action, patch, .. }) => {
                assert_eq!(action, "complete_macroscopy");
                assert!(patch.is_some());
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn runs_against_in_memory_service() {
        let service = WorkflowService::new(
            Arc::new(CoreConfig::ephemeral()),
            lab_core::AnyStore::Memory(lab_core::MemoryStore::new()),
            Arc::new(lab_core::StaticOrderDirectory::new()),
        );
        run(Commands::Sample(SampleCommand::List), &service).unwrap();

        let err = run(
            Commands::Sample(SampleCommand::Create {
                order: "ORD-1".into(),
                sample_type: None,
                origin: None,
                notes: None,
            }),
            &service,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }
}
