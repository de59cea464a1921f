//! webbuddy CLI: run the API server and administer accounts and projects.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::info;
use webbuddy_rs::api::{AppState, build_router};
use webbuddy_rs::config::Config;
use webbuddy_rs::db::Db;
use webbuddy_rs::db::accounts::generate_password;
use webbuddy_rs::model::PageRequest;
use webbuddy_rs::model::project::{NewProject, ProjectId};
use webbuddy_rs::model::query::{QueryFilter, QueryId, Status};
use webbuddy_rs::model::user::{NewUser, Role};
use webbuddy_rs::notify::PushNotifier;
use webbuddy_rs::scope::Scope;
use webbuddy_rs::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "webbuddy", about = "Query queue for AI-agent workers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Create a project
    CreateProject {
        name: String,
        #[arg(long, default_value = "")]
        context: String,
    },
    /// Create a user account
    CreateUser {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        fio: String,
        /// Project the user belongs to
        #[arg(long)]
        project: Option<i64>,
        /// standard | admin
        #[arg(long, default_value = "standard")]
        role: String,
        #[arg(long)]
        superuser: bool,
        /// Initial password; a temporary one is generated when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create a service account for worker processes
    CreateServiceAccount {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Set a new password and revoke the user's tokens
    ResetPassword {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Query inspection
    Query {
        #[command(subcommand)]
        action: QueryAction,
    },
}

#[derive(Subcommand)]
enum QueryAction {
    /// List queries across all projects
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one query with its execution log
    Show { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let command = match cli.command {
        Command::Serve => return cmd_serve(config).await,
        other => other,
    };

    let db = Db::connect(config.database_url.expose_secret(), config.db_max_connections).await?;
    db.migrate().await?;

    match command {
        Command::Serve | Command::Migrate => {
            println!("Migrations applied.");
            Ok(())
        }
        Command::CreateProject { name, context } => {
            let project = db
                .create_project(NewProject {
                    project_name: name,
                    project_context: context,
                })
                .await?;
            println!("Created project {} ({})", project.id, project.project_name);
            Ok(())
        }
        Command::CreateUser {
            username,
            email,
            fio,
            project,
            role,
            superuser,
            password,
        } => {
            let role: Role = role.parse()?;
            if role == Role::Service {
                anyhow::bail!("use create-service-account for service accounts");
            }
            let new = NewUser {
                username,
                email,
                fio_name: fio,
                role,
                is_superuser: superuser,
                project: project.map(ProjectId),
                first_login: true,
            };
            cmd_create_user(&db, new, password).await
        }
        Command::CreateServiceAccount {
            username,
            email,
            password,
        } => {
            let new = NewUser {
                username,
                email,
                fio_name: String::new(),
                role: Role::Service,
                is_superuser: false,
                project: None,
                first_login: false,
            };
            cmd_create_user(&db, new, password).await
        }
        Command::ResetPassword { username, password } => {
            let generated = password.is_none();
            let password = password.unwrap_or_else(generate_password);
            let user = db.reset_password(&username, &password).await?;
            println!("Password reset for {}", user.username);
            if generated {
                println!("Temporary password: {password}");
            }
            Ok(())
        }
        Command::Query { action } => match action {
            QueryAction::List { status, limit } => cmd_query_list(&db, status, limit).await,
            QueryAction::Show { id } => cmd_query_show(&db, id).await,
        },
    }
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "webbuddy".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret(), config.db_max_connections).await?;
    db.migrate().await?;
    let purged = db.purge_expired_tokens().await?;
    if purged > 0 {
        info!(purged, "expired tokens removed");
    }

    if config.notify.worker_url.is_none() {
        info!("WORKER_NOTIFY_URL not set; workers must poll claim_next");
    }
    let notifier = Arc::new(PushNotifier::new(config.notify.clone())?);

    let state = Arc::new(AppState {
        db,
        notifier,
        token_ttl: config.token_ttl,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}

async fn cmd_create_user(db: &Db, new: NewUser, password: Option<String>) -> anyhow::Result<()> {
    let generated = password.is_none();
    let password = password.unwrap_or_else(generate_password);
    let user = db.create_user(new, &password).await?;
    println!("Created {} user {} (id {})", user.role, user.username, user.id);
    if generated {
        println!("Temporary password: {password}");
    }
    Ok(())
}

async fn cmd_query_list(db: &Db, status: Option<String>, limit: u32) -> anyhow::Result<()> {
    let status: Option<Status> = status.map(|s| s.parse::<Status>()).transpose()?;
    let page = db
        .list_queries(
            &Scope::All,
            QueryFilter { status },
            PageRequest::new(Some(1), Some(limit)),
        )
        .await?;

    if page.results.is_empty() {
        println!("No queries found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<12}  {:<20}  {:<16}  TEXT",
        "ID", "STATUS", "PROJECT", "CREATED"
    );
    println!("{}", "-".repeat(90));
    for query in &page.results {
        let text: String = query.query_text.chars().take(40).collect();
        println!(
            "{:<8}  {:<12}  {:<20}  {:<16}  {}",
            query.id.0,
            query.status.as_str(),
            query.project_name,
            query.query_created.format("%Y-%m-%d %H:%M"),
            text.replace('\n', " ")
        );
    }
    println!("\n{} of {} query(s)", page.results.len(), page.count);
    Ok(())
}

async fn cmd_query_show(db: &Db, id: i64) -> anyhow::Result<()> {
    let detail = db.get_query_detail(QueryId(id), &Scope::All).await?;
    let query = &detail.query;

    println!("ID:         {}", query.id.0);
    println!("Project:    {} ({})", query.project_name, query.project);
    println!("User:       {}", query.user_name);
    println!("Status:     {}", query.status);
    println!("Created:    {}", query.query_created);
    if let Some(started) = query.query_started {
        println!("Started:    {started}");
    }
    if let Some(finished) = query.query_finished {
        println!("Finished:   {finished}");
    }
    println!("---");
    println!("{}", query.query_text);
    if !query.answer_text.is_empty() {
        println!("--- answer");
        println!("{}", query.answer_text);
    }
    if !detail.logs.is_empty() {
        println!("--- {} log entries", detail.logs.len());
        for log in &detail.logs {
            println!("[{}] {}", log.create_dtime.format("%H:%M:%S"), log.log_data);
        }
    }
    Ok(())
}
