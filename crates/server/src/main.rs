//! IdeaForge Server
//!
//! Axum server exposing the idea analysis pipeline over HTTP, with SSE
//! progress streaming, plus a one-shot `analyze` CLI mode.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use futures::{
    future,
    stream::{self, BoxStream, Stream, StreamExt},
};
use ideaforge_core::models::LlmProvider;
use ideaforge_core::pipeline::{
    AnalysisJob, BroadcastPublisher, JobOutcome, NullPublisher, PipelineConfig, ProgressEvent,
    ProgressPublisher, DEFAULT_CONFIG_PATH,
};
use ideaforge_core::skills::{AnalysisRequest, FollowUpAnswers};
use ideaforge_core::state::{
    AnalysisDb, AnalysisStatus, AnalysisStore, AnalysisStoreError, PersistedAnalysis,
    SqliteAnalysisStore,
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_stream::wrappers::BroadcastStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};

/// Application state
struct AppState {
    store: Arc<dyn AnalysisStore>,
    job: Arc<AnalysisJob>,
    publisher: BroadcastPublisher,
}

type SharedState = Arc<AppState>;

// === API Types ===

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct CreateAnalysisRequest {
    idea: String,
    /// Question → answer pairs, kept in order
    #[serde(default)]
    #[schema(value_type = Object)]
    follow_up_answers: FollowUpAnswers,
}

#[derive(Debug, Serialize, ToSchema)]
struct CreateAnalysisResponse {
    id: String,
    status: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    id: String,
    idea: String,
    #[schema(value_type = Object)]
    follow_up_answers: FollowUpAnswers,
    /// analyzing | completed | failed
    status: String,
    current_stage: usize,
    score: Option<i64>,
    #[schema(value_type = Option<Object>)]
    analysis_result: Option<serde_json::Value>,
    is_real_analysis: bool,
    is_partial_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<PersistedAnalysis> for AnalysisResponse {
    fn from(a: PersistedAnalysis) -> Self {
        Self {
            id: a.id,
            idea: a.idea,
            follow_up_answers: a.follow_up_answers,
            status: a.status.as_str().to_string(),
            current_stage: a.current_stage,
            score: a.score,
            analysis_result: a.analysis_result,
            is_real_analysis: a.is_real_analysis,
            is_partial_success: a.is_partial_success,
            error_message: a.error_message,
            created_at: a.created_at.to_rfc3339(),
            updated_at: a.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[derive(Parser, Clone)]
#[command(author, version, about = "IdeaForge - Startup Idea Analyzer")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
    /// LLM provider (anthropic, openai, gemini, openrouter, grok, deepseek)
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Model name; defaults to the provider's default model
    #[arg(long, global = true)]
    model: Option<String>,
    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the IdeaForge server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Analyze one idea and print the stored record (CLI mode, no server)
    Analyze {
        /// The idea to analyze
        idea: String,
        /// Follow-up answer as key=value, repeatable
        #[arg(short, long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },
}

fn parse_answer(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Load `.ideaforge/config.json` and apply CLI overrides
fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load(DEFAULT_CONFIG_PATH)?;
    apply_overrides(&mut config, args.provider.as_deref(), args.model.as_deref())?;
    Ok(config)
}

fn apply_overrides(
    config: &mut PipelineConfig,
    provider: Option<&str>,
    model: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(name) = provider {
        let provider = LlmProvider::parse(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider '{}'", name))?;
        if provider != config.model.provider {
            config.model.model = provider.default_model().to_string();
            config.model.provider = provider;
        }
    }
    if let Some(model) = model {
        config.model.model = model.to_string();
    }
    Ok(())
}

fn open_store(db: Option<&PathBuf>) -> anyhow::Result<Arc<dyn AnalysisStore>> {
    let db = match db {
        Some(path) => AnalysisDb::open_at(path)?,
        None => AnalysisDb::open()?,
    };
    Ok(Arc::new(SqliteAnalysisStore::new(&db)))
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "IdeaForge API",
        version = "1.0.0",
        description = "API for the IdeaForge startup idea analyzer"
    ),
    paths(create_analysis, get_analysis, analysis_events),
    components(schemas(
        CreateAnalysisRequest,
        CreateAnalysisResponse,
        AnalysisResponse,
        ErrorResponse
    )),
    tags(
        (name = "analyses", description = "Idea analysis runs")
    )
)]
struct ApiDoc;

// === Analysis Handlers ===

/// Create an analysis and start it in the background
#[utoipa::path(
    post,
    path = "/api/v1/analyses",
    tag = "analyses",
    request_body = CreateAnalysisRequest,
    responses(
        (status = 201, description = "Analysis created", body = CreateAnalysisResponse),
        (status = 400, description = "Empty idea", body = ErrorResponse)
    )
)]
async fn create_analysis(
    State(state): State<SharedState>,
    Json(req): Json<CreateAnalysisRequest>,
) -> Result<(StatusCode, Json<CreateAnalysisResponse>), ApiError> {
    let request = AnalysisRequest::new(req.idea, req.follow_up_answers)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let analysis = PersistedAnalysis::new(&request);
    state.store.create(&analysis).map_err(|e| {
        tracing::error!(error = %e, "Failed to create analysis");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let job = state.job.clone();
    let id = analysis.id.clone();
    tokio::spawn(async move {
        if let Err(e) = job.perform(&id).await {
            tracing::error!(analysis_id = %id, error = %e, "Analysis job aborted");
        }
    });

    Ok((
        StatusCode::CREATED,
        Json(CreateAnalysisResponse {
            id: analysis.id,
            status: analysis.status.as_str().to_string(),
        }),
    ))
}

/// Get an analysis record
#[utoipa::path(
    get,
    path = "/api/v1/analyses/{id}",
    tag = "analyses",
    params(("id" = String, Path, description = "Analysis id")),
    responses(
        (status = 200, description = "Analysis record", body = AnalysisResponse),
        (status = 404, description = "Unknown analysis", body = ErrorResponse)
    )
)]
async fn get_analysis(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    match state.store.load(&id) {
        Ok(analysis) => Ok(Json(analysis.into())),
        Err(e @ AnalysisStoreError::NotFound(_)) => {
            Err(api_error(StatusCode::NOT_FOUND, e.to_string()))
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// How often an open event stream re-reads the record. Catches a run that
/// failed (no broadcast event) or a completion the subscriber lagged past.
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One item on an analysis event stream
#[derive(Debug, Clone, PartialEq)]
enum StreamEvent {
    Progress(ProgressEvent),
    /// Sent by the stream itself; failures are not broadcast
    Failed {
        analysis_id: String,
        error_message: Option<String>,
    },
}

impl StreamEvent {
    fn name(&self) -> &'static str {
        match self {
            StreamEvent::Progress(ProgressEvent::StageProgress { .. }) => "stage_progress",
            StreamEvent::Progress(ProgressEvent::AnalysisCompleted { .. }) => "analysis_completed",
            StreamEvent::Failed { .. } => "analysis_failed",
        }
    }

    fn is_final(&self) -> bool {
        match self {
            StreamEvent::Progress(event) => event.is_final(),
            StreamEvent::Failed { .. } => true,
        }
    }

    fn into_sse(self) -> Event {
        let data = match &self {
            StreamEvent::Progress(event) => serde_json::to_string(event).unwrap_or_default(),
            StreamEvent::Failed {
                analysis_id,
                error_message,
            } => serde_json::json!({
                "type": "analysis_failed",
                "analysisId": analysis_id,
                "errorMessage": error_message,
            })
            .to_string(),
        };
        Event::default().event(self.name()).data(data)
    }
}

/// Final event for a record that already reached a terminal status
fn terminal_event(analysis: &PersistedAnalysis) -> Option<StreamEvent> {
    match analysis.status {
        AnalysisStatus::Analyzing => None,
        AnalysisStatus::Completed => Some(StreamEvent::Progress(ProgressEvent::completed(
            &analysis.id,
        ))),
        AnalysisStatus::Failed => Some(StreamEvent::Failed {
            analysis_id: analysis.id.clone(),
            error_message: analysis.error_message.clone(),
        }),
    }
}

/// Events for one analysis, ending after the final one.
///
/// Finished analyses get their final event straight away. For a running
/// one we subscribe before re-reading the record, so a run that finishes
/// in between is still seen.
fn analysis_stream(
    store: Arc<dyn AnalysisStore>,
    publisher: &BroadcastPublisher,
    id: String,
    poll_interval: Duration,
) -> Result<BoxStream<'static, StreamEvent>, AnalysisStoreError> {
    if let Some(event) = terminal_event(&store.load(&id)?) {
        return Ok(stream::once(future::ready(event)).boxed());
    }

    let receiver = publisher.subscribe();
    if let Some(event) = terminal_event(&store.load(&id)?) {
        return Ok(stream::once(future::ready(event)).boxed());
    }

    let live_id = id.clone();
    let live = BroadcastStream::new(receiver).filter_map(move |msg| {
        let event = match msg {
            Ok(event) if event.analysis_id() == live_id => Some(StreamEvent::Progress(event)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "SSE subscriber lagged");
                None
            }
        };
        future::ready(event)
    });

    let polled = stream::unfold((store, id), move |(store, id)| async move {
        tokio::time::sleep(poll_interval).await;
        match store.load(&id) {
            Ok(analysis) => Some((terminal_event(&analysis), (store, id))),
            Err(e) => {
                tracing::warn!(error = %e, "Event stream lost its analysis record");
                None
            }
        }
    })
    .filter_map(future::ready);

    let events = stream::select(live, polled).scan(false, |finished, event| {
        if *finished {
            return future::ready(None);
        }
        *finished = event.is_final();
        future::ready(Some(event))
    });
    Ok(events.boxed())
}

/// SSE stream of one analysis's progress events; ends after completion or failure
#[utoipa::path(
    get,
    path = "/api/v1/analyses/{id}/events",
    tag = "analyses",
    params(("id" = String, Path, description = "Analysis id")),
    responses(
        (status = 200, description = "text/event-stream of progress events"),
        (status = 404, description = "Analysis not found", body = ErrorResponse)
    )
)]
async fn analysis_events(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = analysis_stream(state.store.clone(), &state.publisher, id, STATUS_POLL_INTERVAL)
        .map_err(|e| match e {
            AnalysisStoreError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
            e => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;

    Ok(Sse::new(events.map(|event| Ok(event.into_sse()))).keep_alive(KeepAlive::default()))
}

/// Serve OpenAPI JSON spec
async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn router(state: SharedState) -> Router {
    let analysis_routes = Router::new()
        .route("/", post(create_analysis))
        .route("/:id", get(get_analysis))
        .route("/:id/events", get(analysis_events));

    Router::new()
        .nest("/api/v1/analyses", analysis_routes)
        .route("/api/v1/openapi.json", get(serve_openapi))
        .with_state(state)
}

async fn run_server(args: &Args, port: u16) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let store = open_store(args.db.as_ref())?;
    let publisher = BroadcastPublisher::new(256);
    let job = AnalysisJob::from_config(&config, store.clone(), Arc::new(publisher.clone()))?;

    let state: SharedState = Arc::new(AppState {
        store,
        job: Arc::new(job),
        publisher,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(%addr, mode = ?config.market_data_mode, "IdeaForge server listening");
    println!("🚀 IdeaForge Server running at http://{}", addr);
    println!("   POST /api/v1/analyses");
    println!("   GET  /api/v1/analyses/:id");
    println!("   GET  /api/v1/analyses/:id/events (SSE)");
    println!("   GET  /api/v1/openapi.json");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn run_analyze(args: &Args, idea: &str, answers: &[(String, String)]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let store = open_store(args.db.as_ref())?;
    let publisher: Arc<dyn ProgressPublisher> = Arc::new(NullPublisher);
    let job = AnalysisJob::from_config(&config, store.clone(), publisher)?;

    let request = AnalysisRequest::new(idea, answers.iter().cloned().collect())?;
    let analysis = PersistedAnalysis::new(&request);
    store.create(&analysis)?;

    let outcome = job.perform(&analysis.id).await?;
    let record = store.load(&analysis.id)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&AnalysisResponse::from(record))?
    );

    if outcome == JobOutcome::Failed {
        anyhow::bail!("Analysis {} failed", analysis.id);
    }
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Keys must be in the environment before the capability check
    dotenvy::dotenv().ok();
    dotenvy::from_path(".ideaforge/.env").ok();
    init_logging();

    let args = Args::parse();
    match args.command.clone() {
        Some(CliCommand::Analyze { idea, answers }) => run_analyze(&args, &idea, &answers).await,
        Some(CliCommand::Serve { port }) => run_server(&args, port).await,
        None => run_server(&args, 8080).await,
    }
}
