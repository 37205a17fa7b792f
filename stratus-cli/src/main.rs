mod manifest;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::debug;

use stratus_core::provider::{Provider, check_required_attributes};
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_provider::resources::resource_types;
use stratus_provider::{InstanceConfig, InstanceProvider, ProviderConfig};
use stratus_state::{
    BackendConfig, ReferenceRecord, ResourceState, StateBackend, StateFile,
    create_backend,
};

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Provision instances on a cloud management service by name", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Base URL of the management API
    #[arg(long, env = "STRATUS_URL", global = true)]
    url: Option<String>,

    /// API access token
    #[arg(long, env = "STRATUS_ACCESS_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "STRATUS_TIMEOUT_SECS", default_value_t = stratus_provider::config::DEFAULT_TIMEOUT_SECS, global = true)]
    timeout: u64,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Path to the state file
    #[arg(long, default_value = "stratus.state.json", global = true)]
    state: PathBuf,

    /// Log resolution steps
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the manifest without contacting the service
    Validate {
        /// Path to manifest
        #[arg(default_value = "stratus.json")]
        file: PathBuf,
    },
    /// Resolve every name to an id without provisioning
    Resolve {
        /// Path to manifest
        #[arg(default_value = "stratus.json")]
        file: PathBuf,

        /// Print the request body that apply would submit
        #[arg(long)]
        payload: bool,
    },
    /// Provision new instances and update existing ones
    Apply {
        /// Path to manifest
        #[arg(default_value = "stratus.json")]
        file: PathBuf,
    },
    /// Show the live state of recorded instances
    Show,
    /// Delete every recorded instance
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Remove a lock left behind by an interrupted run
    ForceUnlock {
        /// ID of the lock to remove
        lock_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let global = &cli.global;
    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Resolve { file, payload } => run_resolve(global, &file, payload).await,
        Commands::Apply { file } => run_apply(global, &file).await,
        Commands::Show => run_show(global).await,
        Commands::Destroy { auto_approve } => run_destroy(global, auto_approve).await,
        Commands::ForceUnlock { lock_id } => run_force_unlock(global, &lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn get_provider(global: &GlobalArgs) -> Result<InstanceProvider, String> {
    let config = ProviderConfig::new(
        global.url.clone().unwrap_or_default(),
        global.token.clone().unwrap_or_default(),
    )
    .with_timeout(Duration::from_secs(global.timeout))
    .with_insecure(global.insecure);
    config.validate().map_err(|e| {
        format!(
            "{} (pass --url/--token or set STRATUS_URL/STRATUS_ACCESS_TOKEN)",
            e
        )
    })?;
    InstanceProvider::new(&config).map_err(|e| e.to_string())
}

fn get_backend(global: &GlobalArgs) -> Result<Box<dyn StateBackend>, String> {
    create_backend(&BackendConfig::local(global.state.to_string_lossy()))
        .map_err(|e| e.to_string())
}

/// Check required attributes and attribute shapes of every resource
fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let types = resource_types();
    let mut all_errors = Vec::new();

    for resource in resources {
        let Some(resource_type) = types
            .iter()
            .find(|t| t.name() == resource.id.resource_type)
        else {
            all_errors.push(format!(
                "{}: unknown resource type `{}`",
                resource.id, resource.id.resource_type
            ));
            continue;
        };
        if let Err(errors) = check_required_attributes(resource_type.as_ref(), resource) {
            all_errors.extend(errors);
        }
        if let Err(e) = InstanceConfig::from_resource(resource) {
            all_errors.push(format!("{}: {}", resource.id, e));
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

fn load_resources(file: &PathBuf) -> Result<Vec<Resource>, String> {
    let resources = manifest::load(file)?;
    validate_resources(&resources)?;
    Ok(resources)
}

fn run_validate(file: &PathBuf) -> Result<(), String> {
    let resources = manifest::load(file)?;

    println!("{}", "Validating...".cyan());
    validate_resources(&resources)?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len())
            .green()
            .bold()
    );
    for resource in &resources {
        println!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_resolve(global: &GlobalArgs, file: &PathBuf, show_payload: bool) -> Result<(), String> {
    let resources = load_resources(file)?;
    let provider = get_provider(global)?;

    for resource in &resources {
        let plan = provider
            .plan_instance(resource)
            .await
            .map_err(|e| e.to_string())?;

        println!("{}", resource.id.to_string().cyan().bold());
        for reference in plan.context.references() {
            let code = if reference.code.is_empty() {
                String::new()
            } else {
                format!(" ({})", reference.code)
            };
            println!(
                "  {:<14} {} {}{}",
                reference.kind.to_string(),
                reference.id.green(),
                reference.name,
                code.dimmed()
            );
        }
        if show_payload {
            let body = serde_json::to_string_pretty(&plan.request.to_json())
                .map_err(|e| e.to_string())?;
            println!("{}", body);
        }
        println!();
    }
    Ok(())
}

/// Run `work` while holding the state lock, releasing it whatever the outcome
async fn with_lock<T>(
    backend: &dyn StateBackend,
    operation: &str,
    work: impl Future<Output = Result<T, String>>,
) -> Result<T, String> {
    let lock = backend
        .acquire_lock(operation)
        .await
        .map_err(|e| format!("Failed to acquire state lock: {}", e))?;
    debug!("acquired state lock {}", lock.id);

    let result = work.await;

    if let Err(e) = backend.release_lock(&lock).await {
        eprintln!(
            "{} failed to release state lock {}: {}",
            "Warning:".yellow().bold(),
            lock.id,
            e
        );
    }
    result
}

async fn run_apply(global: &GlobalArgs, file: &PathBuf) -> Result<(), String> {
    let resources = load_resources(file)?;
    let provider = get_provider(global)?;
    let backend = get_backend(global)?;

    with_lock(backend.as_ref(), "apply", async {
        let mut state = backend
            .read_state()
            .await
            .map_err(|e| e.to_string())?
            .unwrap_or_default();

        println!("{}", "Applying changes...".cyan().bold());
        println!();

        let mut success_count = 0;
        let mut failure_count = 0;

        for resource in &resources {
            let recorded = state
                .find_resource(&resource.id.resource_type, &resource.id.name)
                .map(|r| r.identifier.clone());

            let current = match &recorded {
                Some(identifier) => provider
                    .read(&resource.id, Some(identifier))
                    .await
                    .map_err(|e| e.to_string())?,
                None => State::not_found(resource.id.clone()),
            };

            let (label, result) = match (&recorded, current.exists) {
                (Some(identifier), true) => (
                    "~",
                    provider
                        .update(&resource.id, identifier, &current, resource)
                        .await
                        .map(|s| (s, false)),
                ),
                _ => ("+", provider.create(resource).await.map(|s| (s, true))),
            };

            match result {
                Ok((new_state, created)) => {
                    println!("  {} {} {}", "✓".green(), label, resource.id);
                    success_count += 1;
                    let previous = state
                        .find_resource(&resource.id.resource_type, &resource.id.name)
                        .cloned();
                    state.upsert_resource(record_state(
                        provider.name(),
                        &new_state,
                        if created { None } else { previous },
                    ));
                    state.increment_serial();
                    backend
                        .write_state(&state)
                        .await
                        .map_err(|e| format!("Failed to save state: {}", e))?;
                }
                Err(e) => {
                    println!("  {} {} {} - {}", "✗".red(), label, resource.id, e);
                    failure_count += 1;
                }
            }
        }

        println!();
        if failure_count == 0 {
            println!(
                "{}",
                format!("Apply complete! {} instances applied.", success_count)
                    .green()
                    .bold()
            );
            Ok(())
        } else {
            Err(format!(
                "Apply failed. {} succeeded, {} failed.",
                success_count, failure_count
            ))
        }
    })
    .await
}

/// Resolved-id attributes and the stage each belongs to
/// Resolution attributes that go to `ResourceState::references` rather than `attributes`
const REFERENCE_ATTRIBUTES: &[&str] = &[
    "references",
    "group_id",
    "cloud_id",
    "instance_type_id",
    "layout_id",
    "plan_id",
    "resource_pool_id",
];

fn reference_records(state: &State) -> Vec<ReferenceRecord> {
    let Some(Value::List(references)) = state.attributes.get("references") else {
        return Vec::new();
    };
    references
        .iter()
        .filter_map(|reference| {
            let Value::Map(fields) = reference else {
                return None;
            };
            let field = |key: &str| {
                fields
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Some(ReferenceRecord {
                kind: field("kind"),
                id: field("id"),
                code: field("code"),
                name: field("name"),
            })
        })
        .collect()
}

/// Build the state record for an applied instance.
///
/// Updates do not re-run resolution, so they keep the references recorded at creation.
fn record_state(provider: &str, state: &State, previous: Option<ResourceState>) -> ResourceState {
    let identifier = state.identifier.clone().unwrap_or_default();
    let mut record = ResourceState::new(
        state.id.resource_type.as_str(),
        state.id.name.as_str(),
        provider,
        identifier,
    );

    match previous {
        Some(previous) => {
            record.references = previous.references;
            record.created_at = previous.created_at;
        }
        None => {
            for reference in reference_records(state) {
                record = record.with_reference(reference);
            }
        }
    }

    for (key, value) in &state.attributes {
        if !REFERENCE_ATTRIBUTES.contains(&key.as_str()) {
            record.attributes.insert(key.clone(), value.to_json());
        }
    }
    record
}

fn resource_id(record: &ResourceState) -> ResourceId {
    ResourceId::new(record.resource_type.as_str(), record.name.as_str())
}

async fn read_recorded_state(global: &GlobalArgs) -> Result<StateFile, String> {
    let backend = get_backend(global)?;
    Ok(backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default())
}

async fn run_show(global: &GlobalArgs) -> Result<(), String> {
    let state = read_recorded_state(global).await?;
    if state.resources.is_empty() {
        println!("{}", "No instances recorded.".yellow());
        return Ok(());
    }

    let provider = get_provider(global)?;
    for record in &state.resources {
        let id = resource_id(record);
        let live = provider
            .read(&id, Some(&record.identifier))
            .await
            .map_err(|e| e.to_string())?;

        let status = if live.exists {
            "present".green()
        } else {
            "missing".red()
        };
        println!("{} ({}) {}", id.to_string().bold(), record.identifier, status);
        for reference in &record.references {
            println!("  {:<14} {}", reference.kind, reference.id);
        }
        let mut keys: Vec<_> = live.attributes.keys().collect();
        keys.sort();
        for key in keys {
            println!("  {:<14} {}", key, live.attributes[key].to_json());
        }
        println!();
    }
    Ok(())
}

async fn run_destroy(global: &GlobalArgs, auto_approve: bool) -> Result<(), String> {
    let recorded = read_recorded_state(global).await?;
    if recorded.resources.is_empty() {
        println!("{}", "No instances to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for record in &recorded.resources {
        println!(
            "  {} {} ({})",
            "-".red().bold(),
            resource_id(record),
            record.identifier
        );
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        recorded.resources.len().to_string().red()
    );
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all instances?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    let provider = get_provider(global)?;
    let backend = get_backend(global)?;

    with_lock(backend.as_ref(), "destroy", async {
        let mut state = backend
            .read_state()
            .await
            .map_err(|e| e.to_string())?
            .unwrap_or_default();

        println!("{}", "Destroying instances...".red().bold());
        println!();

        let mut success_count = 0;
        let mut failure_count = 0;
        let records = state.resources.clone();
        for record in records {
            let id = resource_id(&record);
            match provider.delete(&id, &record.identifier).await {
                Ok(()) => {
                    println!("  {} - {}", "✓".green(), id);
                    success_count += 1;
                    state.remove_resource(&record.resource_type, &record.name);
                    state.increment_serial();
                    backend
                        .write_state(&state)
                        .await
                        .map_err(|e| format!("Failed to save state: {}", e))?;
                }
                Err(e) => {
                    println!("  {} - {} - {}", "✗".red(), id, e);
                    failure_count += 1;
                }
            }
        }

        println!();
        if failure_count == 0 {
            println!(
                "{}",
                format!("Destroy complete! {} instances destroyed.", success_count)
                    .green()
                    .bold()
            );
            Ok(())
        } else {
            Err(format!(
                "Destroy failed. {} succeeded, {} failed.",
                success_count, failure_count
            ))
        }
    })
    .await
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    Ok(input.trim() == "yes")
}

async fn run_force_unlock(global: &GlobalArgs, lock_id: &str) -> Result<(), String> {
    let backend = get_backend(global)?;
    if let Some(lock) = backend.current_lock().await.map_err(|e| e.to_string())? {
        println!(
            "Lock {} held by {} for {} since {}",
            lock.id, lock.who, lock.operation, lock.created
        );
    }
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} removed.", lock_id).green().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn reference(kind: &str, id: &str, code: &str, name: &str) -> Value {
        Value::Map(HashMap::from([
            ("kind".to_string(), Value::String(kind.into())),
            ("id".to_string(), Value::String(id.into())),
            ("code".to_string(), Value::String(code.into())),
            ("name".to_string(), Value::String(name.into())),
        ]))
    }

    fn applied_state() -> State {
        State::existing(
            ResourceId::new("instance", "web"),
            HashMap::from([
                ("name".to_string(), Value::String("web-01".into())),
                ("group_id".to_string(), Value::String("1".into())),
                ("plan_id".to_string(), Value::String("6".into())),
                (
                    "references".to_string(),
                    Value::List(vec![
                        reference("group", "1", "prod", "prod"),
                        reference("plan", "6", "vm-small", "Small"),
                        reference("datastore", "31", "", "Datastore-A - 1.2TB Free"),
                    ]),
                ),
            ]),
        )
        .with_identifier("501")
    }

    #[test]
    fn test_record_state_for_created_instance() {
        let record = record_state("stratus", &applied_state(), None);
        assert_eq!(record.identifier, "501");
        assert_eq!(record.reference_id("group"), Some("1"));
        assert_eq!(record.reference_id("plan"), Some("6"));
        assert_eq!(record.reference_id("datastore"), Some("31"));
        assert_eq!(record.attributes.get("name"), Some(&serde_json::json!("web-01")));
        assert!(!record.attributes.contains_key("plan_id"));
        assert!(!record.attributes.contains_key("references"));
    }

    #[test]
    fn test_record_state_keeps_code_and_name() {
        let record = record_state("stratus", &applied_state(), None);
        let plan = record
            .references
            .iter()
            .find(|r| r.kind == "plan")
            .unwrap();
        assert_eq!(plan.code, "vm-small");
        assert_eq!(plan.name, "Small");
    }

    #[test]
    fn test_record_state_keeps_references_on_update() {
        let previous = ResourceState::new("instance", "web", "stratus", "501").with_reference(
            ReferenceRecord {
                kind: "layout".to_string(),
                id: "4".to_string(),
                code: String::new(),
                name: "web-template".to_string(),
            },
        );
        let created_at = previous.created_at;
        let record = record_state("stratus", &applied_state(), Some(previous));
        assert_eq!(record.reference_id("layout"), Some("4"));
        assert_eq!(record.reference_id("group"), None);
        assert_eq!(record.created_at, created_at);
    }

    #[test]
    fn test_validate_reports_missing_and_unknown() {
        let resources = manifest::parse(
            r#"{
                "instance": {"web": {"group": "prod", "cloud": "c", "instance_type": "t", "layout": "l"}},
                "volume": {"data": {}}
            }"#,
        )
        .unwrap();
        let err = validate_resources(&resources).unwrap_err();
        assert!(err.contains("instance.web: missing required attribute `plan`"));
        assert!(err.contains("volume.data: unknown resource type `volume`"));
    }

    #[test]
    fn test_get_provider_requires_url() {
        let global = GlobalArgs {
            url: None,
            token: Some("t".to_string()),
            timeout: 30,
            insecure: false,
            state: PathBuf::from("stratus.state.json"),
            verbose: false,
        };
        let err = get_provider(&global).err().unwrap();
        assert!(err.starts_with("missing required setting `url`"));
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = create_backend(&BackendConfig::local(
            dir.path().join("s.json").to_string_lossy(),
        ))
        .unwrap();

        let result: Result<(), String> =
            with_lock(backend.as_ref(), "apply", async { Err("boom".to_string()) }).await;
        assert_eq!(result.unwrap_err(), "boom");
        assert!(backend.current_lock().await.unwrap().is_none());
    }
}
