use clap::{Parser, Subcommand};
use plotledger::{
    Error, NewProject, Payment, Plot, PlotStatus, ProjectFilter, RequestContext, SchemaPlan, Store,
    WithContext, models,
};
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "plotledger", version, about = "Plot inventory ledger CLI")]
struct Cli {
    /// Postgres connection string. Falls back to DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Schema holding the projects table (default: public)
    #[arg(long, default_value = "public")]
    schema: String,

    /// Reload-and-retry rounds after a concurrent write
    #[arg(long, default_value_t = 5)]
    conflict_retries: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show planned DDL changes without applying
    SchemaPlan,

    /// Apply DDL changes (create schema/table/indexes as needed)
    SchemaSync,

    /// Create a project from a JSON file (`-` reads stdin)
    ProjectCreate {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        file: String,
    },

    /// List the owner's projects, newest first
    ProjectList {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },

    /// List plots of a project in stored order
    PlotsList {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        project: Uuid,
        /// Available, Reserved or Sold
        #[arg(long)]
        status: Option<String>,
    },

    /// Add a single plot
    PlotAdd {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        file: String,
    },

    /// Replace a plot's full record (payments included)
    PlotReplace {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        plot_number: String,
        #[arg(long)]
        file: String,
    },

    /// Add a JSON array of plots, all or nothing
    PlotsBulk {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        file: String,
    },

    /// Append a payment to a plot
    PaymentAdd {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        plot_number: String,
        #[arg(long)]
        file: String,
    },
}

#[tokio::main]
async fn main() -> plotledger::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let url = match cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        Some(u) => u,
        None => {
            eprintln!("error: --database-url or env DATABASE_URL is required");
            std::process::exit(2);
        }
    };

    let store = Store::builder(url)
        .schema(cli.schema)
        .conflict_retries(cli.conflict_retries)
        .build()
        .await?;

    if let Err(err) = run(&store, cli.command).await {
        eprintln!("error ({}): {err}", err.http_status());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(store: &Store, command: Commands) -> plotledger::Result<()> {
    let plots = store.plots();
    match command {
        Commands::SchemaPlan => {
            let plan = store.schema().plan(&store.schema_config()).await?;
            print_plan(&plan);
        }
        Commands::SchemaSync => {
            let plan = store.schema().sync(&store.schema_config()).await?;
            if plan.is_empty() {
                println!("No changes needed.");
            } else {
                println!("Applied changes:");
                print_plan(&plan);
            }
        }
        Commands::ProjectCreate { owner, file } => {
            let details: NewProject = models::parse("project", read_json(&file)?)?;
            let project = plots.create_project(&RequestContext::new(owner), details).await?;
            print_json(&project)?;
        }
        Commands::ProjectList {
            owner,
            area,
            search,
        } => {
            let filter = ProjectFilter { area, search };
            let projects = plots
                .list_projects(&RequestContext::new(owner), &filter)
                .await?;
            print_json(&projects)?;
        }
        Commands::PlotsList {
            owner,
            project,
            status,
        } => {
            let status = status.map(|s| s.parse::<PlotStatus>()).transpose()?;
            let listed = plots
                .list_plots(&RequestContext::new(owner), project, status)
                .await?;
            print_json(&listed)?;
        }
        Commands::PlotAdd {
            owner,
            project,
            file,
        } => {
            let plot: Plot = models::parse("plot", read_json(&file)?)?;
            let outcome = plots
                .insert_plot(&RequestContext::new(owner), project, plot)
                .await?;
            print_json(&outcome)?;
        }
        Commands::PlotReplace {
            owner,
            project,
            plot_number,
            file,
        } => {
            let plot: Plot = models::parse("plot", read_json(&file)?)?;
            let outcome = plots
                .replace_plot(&RequestContext::new(owner), project, &plot_number, plot)
                .await?;
            print_json(&outcome)?;
        }
        Commands::PlotsBulk {
            owner,
            project,
            file,
        } => {
            let batch = models::parse_plots(read_json(&file)?)?;
            let outcome = plots
                .bulk_insert(&RequestContext::new(owner), project, batch)
                .await?;
            print_json(&outcome)?;
        }
        Commands::PaymentAdd {
            owner,
            project,
            plot_number,
            file,
        } => {
            let payment: Payment = models::parse("payment", read_json(&file)?)?;
            let appended = plots
                .append_payment(&RequestContext::new(owner), project, &plot_number, payment)
                .await?;
            print_json(&appended)?;
        }
    }
    Ok(())
}

fn read_json(path: &str) -> plotledger::Result<Value> {
    let raw = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(Error::from)
            .context("reading stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .map_err(Error::from)
            .context(format!("reading {path}"))?
    };
    models::parse_str("payload", &raw)
}

fn print_json<T: Serialize>(value: &T) -> plotledger::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_plan(plan: &SchemaPlan) {
    if !plan.warnings().is_empty() {
        eprintln!("Warnings ({}):", plan.warnings().len());
        for w in plan.warnings() {
            eprintln!("  - {}", w);
        }
    }

    if plan.actions().is_empty() {
        println!("No pending DDL actions.");
        return;
    }

    println!("DDL actions ({}):", plan.actions().len());
    for (i, action) in plan.actions().iter().enumerate() {
        println!("{}. {}", i + 1, action.description());
        println!("{}\n", action.sql());
    }
}
