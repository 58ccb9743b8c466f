use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulsecore::{
    ExecutionEvent, Node, NodeKind, TriggerType, VarMap, WorkflowDefinition,
};
use pulseruntime::{GraphValidator, HandlerRegistry, PulseRuntime, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Pulse workflow automation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow definition file
    Run {
        /// Path to workflow definition JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Trigger input data as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow definition file
    Validate {
        /// Path to workflow definition JSON file
        file: PathBuf,
    },

    /// List registered node handler types
    Handlers,

    /// Create an example workflow definition
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, input, verbose } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            tracing_subscriber::fmt().with_max_level(level).init();

            run_workflow(file, input).await?;
        }
        Commands::Validate { file } => {
            validate_workflow(file)?;
        }
        Commands::Handlers => {
            list_handlers();
        }
        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

fn build_registry() -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    pulsenodes::register_all(&mut registry);
    Arc::new(registry)
}

async fn run_workflow(file: PathBuf, input: Option<String>) -> Result<()> {
    let definition_json = std::fs::read_to_string(&file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let mut definition: WorkflowDefinition = serde_json::from_str(&definition_json)?;
    // A manual CLI run still goes through validation and admission.
    definition.is_active = true;

    println!("Workflow: {} (tenant {})", definition.name, definition.tenant_id);
    println!(
        "   {} nodes, {} edges",
        definition.graph.nodes.len(),
        definition.graph.edges.len()
    );

    let input_data: VarMap = match input {
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            match value {
                serde_json::Value::Object(map) => map,
                _ => anyhow::bail!("input must be a JSON object"),
            }
        }
        None => VarMap::new(),
    };

    let runtime = PulseRuntime::with_registry(build_registry(), RuntimeConfig::default());
    let tenant_id = definition.tenant_id;
    let workflow_id = definition.id;

    let report = runtime.deploy(definition).await?;
    if !report.is_valid() {
        println!("Definition failed validation:");
        for error in &report.errors {
            println!("   error: {error}");
        }
        anyhow::bail!("workflow cannot be activated");
    }
    for warning in &report.warnings {
        println!("   warning: {warning}");
    }

    // Stream lifecycle events while the run progresses.
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::Started { execution_id, .. } => {
                    println!("▶ execution {execution_id} started");
                }
                ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
                    println!("  ✔ node {node_id} completed in {duration_ms}ms");
                }
                ExecutionEvent::Completed { duration_ms, .. } => {
                    println!("✔ execution completed in {duration_ms}ms");
                }
                ExecutionEvent::Failed { status, error, .. } => {
                    println!("✘ execution {status}: {error}");
                }
            }
        }
    });

    let record = runtime
        .execute_workflow(tenant_id, workflow_id, input_data)
        .await?;

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    event_task.abort();

    println!();
    println!("Execution {}", record.id);
    println!("   status: {}", record.status);
    if let Some(error) = &record.error_message {
        println!("   error: {error}");
    }
    println!("   steps:");
    for entry in &record.execution_log {
        match &entry.error {
            Some(error) => println!("     {} failed: {}", entry.node_id, error),
            None => println!("     {} completed", entry.node_id),
        }
    }
    if let Some(output) = &record.output_data {
        println!("   output: {}", serde_json::to_string_pretty(output)?);
    }

    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    let definition_json = std::fs::read_to_string(&file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let definition: WorkflowDefinition = serde_json::from_str(&definition_json)?;

    let report = GraphValidator::validate(&definition.graph);
    println!("Workflow: {}", definition.name);
    for error in &report.errors {
        println!("   error: {error}");
    }
    for warning in &report.warnings {
        println!("   warning: {warning}");
    }
    if report.is_valid() {
        println!("✔ graph is valid ({} nodes)", definition.graph.nodes.len());
        Ok(())
    } else {
        anyhow::bail!("graph is invalid");
    }
}

fn list_handlers() {
    let registry = build_registry();
    println!("Registered node handler types:");
    for handler_type in registry.list_handler_types() {
        println!("  • {handler_type}");
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut definition = WorkflowDefinition::new(
        uuid::Uuid::new_v4(),
        "Contact scoring follow-up",
        TriggerType::ContactCreated,
    );

    definition
        .graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node(
            "check_score",
            Node::new(NodeKind::Condition)
                .with_config("field", "score")
                .with_config("operator", "greater_than")
                .with_config("value", 50),
        )
        .add_node(
            "welcome_email",
            Node::new(NodeKind::action("email.send"))
                .with_config("to", "{{email}}")
                .with_config("subject", "Welcome aboard, {{name}}!")
                .with_config("body", "Hi {{name}}, thanks for signing up."),
        )
        .add_node(
            "tag_nurture",
            Node::new(NodeKind::action("data.transform"))
                .with_config("set", serde_json::json!({"stage": "nurture"})),
        )
        .add_node("end", Node::new(NodeKind::End));

    definition.graph.connect("start", "check_score");
    definition
        .graph
        .connect_slot("check_score", "true", "welcome_email");
    definition
        .graph
        .connect_slot("check_score", "false", "tag_nurture");
    definition.graph.connect("welcome_email", "end");
    definition.graph.connect("tag_nurture", "end");

    let json = serde_json::to_string_pretty(&definition)?;
    std::fs::write(&output, json)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  pulse run --file {} --input '{{\"email\": \"ada@example.com\", \"name\": \"Ada\", \"score\": 72}}'",
        output.display()
    );

    Ok(())
}
