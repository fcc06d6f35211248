use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::{Builder, Target};
use log::LevelFilter;
use mapleads_client::domains::auth::{FileSessionStore, SessionEvent};
use mapleads_client::{
    ApiClient, ApiError, ClientConfig, JobBoard, JobFeed, JobTracker,
    SessionService,
};
use mapleads_core::PlanLimits;
use mapleads_model::{
    ExtractionFilters, ExtractionRequest, Job, JobId, JobListQuery, JobSort,
    JobStatus,
};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "mapleads", about = "Run and monitor Google Maps lead extractions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MAPLEADS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "MAPLEADS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Exchange a Google ID token for a session
    GoogleLogin {
        #[arg(long)]
        credential: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user and remaining credits
    Whoami,
    /// List extraction jobs
    Jobs {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long, help = "queued, active, completed, failed, no_data_found")]
        status: Option<String>,
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long, value_enum, default_value_t = SortArg::Newest)]
        sort: SortArg,
    },
    /// Start a new extraction job
    Submit {
        #[arg(long)]
        keyword: String,
        #[arg(long, help = "ISO 3166-1 alpha-2 country code")]
        country: String,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        max_records: u32,
        #[arg(long)]
        min_rating: Option<f32>,
        #[arg(long)]
        max_rating: Option<f32>,
        #[arg(long)]
        min_reviews: Option<u32>,
        #[arg(long)]
        max_reviews: Option<u32>,
        #[arg(long)]
        has_website: Option<bool>,
        #[arg(long)]
        has_phone: Option<bool>,
    },
    /// Delete a job
    Delete { job_id: String },
    /// Download the results of a completed job
    Download {
        job_id: String,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Follow job progress live until interrupted
    Watch {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Newest,
    Oldest,
}

impl From<SortArg> for JobSort {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Newest => JobSort::Newest,
            SortArg::Oldest => JobSort::Oldest,
        }
    }
}

fn init_logger() {
    Builder::new()
        .target(Target::Stderr)
        .filter_level(LevelFilter::Warn)
        .filter_module("mapleads_client", LevelFilter::Info)
        .filter_module("mapleads_core", LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_err() {
        init_logger();
    } else {
        env_logger::init();
    }

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<ApiError>() {
            Some(api_err) if api_err.is_fatal() => {
                eprintln!("{}", api_err.user_message());
                eprintln!("Run `mapleads login` to sign in again.");
                ExitCode::from(2)
            }
            Some(api_err) => {
                log::debug!("{:#}", err);
                eprintln!("{}", api_err.user_message());
                ExitCode::FAILURE
            }
            None => {
                eprintln!("error: {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(command: Command) -> Result<()> {
    let config = ClientConfig::from_environment()
        .context("invalid mapleads configuration")?;
    let store = Arc::new(FileSessionStore::new(config.session_file.clone()));
    let session = SessionService::load(store).await;
    let api = Arc::new(ApiClient::new(&config, Arc::clone(&session))?);

    match command {
        Command::Login { email, password } => {
            let response = api.login(&email, &password).await?;
            print_signed_in(response.user.as_ref().map(|u| u.display_name()));
        }
        Command::Signup {
            name,
            email,
            password,
        } => {
            let response = api.signup(&name, &email, &password).await?;
            print_signed_in(response.user.as_ref().map(|u| u.display_name()));
        }
        Command::GoogleLogin { credential } => {
            let response = api.google_login(&credential).await?;
            print_signed_in(response.user.as_ref().map(|u| u.display_name()));
        }
        Command::Logout => {
            api.logout().await;
            println!("Signed out.");
        }
        Command::Whoami => {
            require_session(&session)?;
            let user = api.current_user().await?;
            println!("{}", user.display_name());
            if let Some(plan) = &user.plan {
                println!("plan:    {}", plan);
            }
            if let Some(credits) = user.credits {
                println!("credits: {}", credits);
            }
        }
        Command::Jobs {
            page,
            limit,
            status,
            keyword,
            sort,
        } => {
            require_session(&session)?;
            let status = status
                .map(|raw| raw.parse::<JobStatus>())
                .transpose()
                .map_err(|e| anyhow!("{}", e))?;
            let query = JobListQuery {
                page,
                limit,
                status,
                keyword,
                sort: sort.into(),
            };
            let jobs = api.list_jobs(&query).await?;
            for job in &jobs.data {
                println!("{}", job_line(job, job.progress));
            }
            println!(
                "page {}/{} ({} jobs)",
                jobs.page,
                jobs.total_pages.max(1),
                jobs.total
            );
        }
        Command::Submit {
            keyword,
            country,
            state,
            city,
            max_records,
            min_rating,
            max_rating,
            min_reviews,
            max_reviews,
            has_website,
            has_phone,
        } => {
            require_session(&session)?;
            let user = api.current_user().await?;
            let limits = PlanLimits {
                max_records_per_job: user
                    .max_records_per_job
                    .unwrap_or(PlanLimits::default().max_records_per_job),
                available_credits: user.credits,
            };
            let request = ExtractionRequest {
                keyword,
                country: country.to_ascii_uppercase(),
                state,
                city,
                max_records,
                filters: ExtractionFilters {
                    min_rating,
                    max_rating,
                    min_reviews,
                    max_reviews,
                    has_website,
                    has_phone,
                },
            };
            let created = api.create_job(&request, &limits).await?;
            match created.job {
                Some(job) => println!("queued {}", job_line(&job, job.progress)),
                None => println!(
                    "{}",
                    created.message.as_deref().unwrap_or("Job submitted.")
                ),
            }
        }
        Command::Delete { job_id } => {
            require_session(&session)?;
            let id = JobId::parse(job_id).map_err(|e| anyhow!("{}", e))?;
            let response = api.delete_job(&id).await?;
            println!("{}", response.message);
        }
        Command::Download { job_id, out_dir } => {
            require_session(&session)?;
            let id = JobId::parse(job_id).map_err(|e| anyhow!("{}", e))?;
            let job = find_job(&api, &id).await?;
            if !job.is_downloadable() {
                return Err(anyhow!(
                    "job {} is {} and has no results to download",
                    job.id,
                    job.status.as_str()
                ));
            }
            let download = api.download_job(&job).await?;
            let path = out_dir.join(&download.filename);
            tokio::fs::write(&path, &download.bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("saved {}", path.display());
        }
        Command::Watch { limit } => {
            require_session(&session)?;
            watch(&config, session, api, limit).await?;
        }
    }
    Ok(())
}

fn require_session(session: &SessionService) -> Result<()> {
    if session.is_authenticated() {
        Ok(())
    } else {
        Err(ApiError::SessionExpired.into())
    }
}

fn print_signed_in(name: Option<&str>) {
    match name {
        Some(name) => println!("Signed in as {}.", name),
        None => println!("Signed in."),
    }
}

/// Page through the listing until `id` turns up.
async fn find_job(api: &ApiClient, id: &JobId) -> Result<Job> {
    let mut query = JobListQuery {
        limit: 100,
        ..JobListQuery::default()
    };
    loop {
        let page = api.list_jobs(&query).await?;
        if let Some(job) = page.data.into_iter().find(|job| &job.id == id) {
            return Ok(job);
        }
        if !page.has_next_page {
            return Err(anyhow!("job {} not found", id));
        }
        query.page += 1;
    }
}

fn job_line(job: &Job, progress: f32) -> String {
    format!(
        "{:<26} {:<14} {:>5.1}%  {:>6} records  {}{}",
        job.id,
        job.status.as_str(),
        progress,
        job.record_count,
        job.keyword,
        job.location
            .as_deref()
            .map(|l| format!(" ({})", l))
            .unwrap_or_default()
    )
}

fn render(board: &JobBoard) {
    let credits = board
        .user
        .as_ref()
        .and_then(|u| u.credits)
        .map(|c| c.to_string())
        .unwrap_or_else(|| "?".to_string());
    println!(
        "-- {} | credits {} --",
        if board.connected { "live" } else { "offline" },
        credits
    );
    for job in &board.jobs.data {
        println!("{}", job_line(job, board.progress_of(job)));
    }
    if let Some(notice) = &board.notice {
        println!("! {}", notice);
    }
}

async fn session_invalidated(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Invalidated { .. } | SessionEvent::SignedOut) => {
                return;
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await
            }
        }
    }
}

async fn watch(
    config: &ClientConfig,
    session: Arc<SessionService>,
    api: Arc<ApiClient>,
    limit: u32,
) -> Result<()> {
    let query = JobListQuery {
        limit,
        ..JobListQuery::default()
    };
    let mut tracker = JobTracker::new(api, query);
    let mut boards = tracker.subscribe();
    let printer = tokio::spawn(async move {
        while boards.changed().await.is_ok() {
            let board = boards.borrow_and_update().clone();
            render(&board);
        }
    });

    let invalidated = session_invalidated(session.on_session_invalidated());
    tracker.refresh().await;

    let Some(mut feed) = JobFeed::connect(config, Arc::clone(&session)) else {
        printer.abort();
        return Err(ApiError::SessionExpired.into());
    };

    tokio::select! {
        _ = tracker.run(&mut feed) => {
            log::info!("job feed ended");
        }
        _ = tokio::signal::ctrl_c() => {}
        _ = invalidated => {}
    }

    feed.close();
    tracker.teardown();
    printer.abort();

    if tracker.board().session_expired || !session.is_authenticated() {
        return Err(ApiError::SessionExpired.into());
    }
    Ok(())
}
