use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use handlebars::Handlebars;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::ReviewConfig;
use crate::error::ReviewError;
use crate::form::{Classification, ReviewFields};
use crate::loader::{load_from_bytes, load_from_path};
use crate::navigator::{Persistence, Step};
use crate::session::{ReviewSession, SessionStore, Source};
use crate::workflow::{list_workbooks, resolve_workbook, save_in_place};

const SESSION_COOKIE: &str = "review_session";
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub struct AppState {
    pub config: ReviewConfig,
    pub sessions: SessionStore,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(config: ReviewConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let mut templates = Handlebars::new();
        templates.register_template_string("landing", include_str!("./static/landing.hbs"))?;
        templates.register_template_string("review", include_str!("./static/review.hbs"))?;
        Ok(AppState {
            sessions: SessionStore::new(config.session_lifetime()),
            config,
            templates,
        })
    }
}

/// Raw review form as posted by the browser. Unchecked boxes are absent.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewForm {
    classification: Option<String>,
    second_opinion: Option<String>,
    request_report: Option<String>,
    location_type: Option<String>,
    comment: Option<String>,
}

impl ReviewForm {
    fn fields(&self) -> ReviewFields {
        ReviewFields::coerce(
            self.classification.as_deref(),
            self.second_opinion.as_deref(),
            self.request_report.as_deref(),
            self.location_type.as_deref(),
            self.comment.as_deref(),
        )
    }
}

#[derive(Deserialize)]
struct LandingQuery {
    error: Option<String>,
}

#[derive(Deserialize)]
struct ReviewQuery {
    tab: Option<String>,
}

#[derive(Deserialize)]
struct OpenForm {
    file: String,
}

/// Sets up `env_logger`, appending to the configured log file when there is one.
pub fn init_logging(config: &ReviewConfig) -> std::io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            record.level(),
            record.args()
        )
    });
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    // A logger may already be installed (tests, embedding); keep it
    let _ = builder.try_init();
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_landing))
        .route("/upload", post(upload_workbook))
        .route("/open", post(open_workbook))
        .route("/review", get(serve_review))
        .route("/review/previous", post(previous_case))
        .route("/review/next", post(next_case))
        .route("/review/submit", post(submit_case))
        .route("/review/edit", post(edit_case))
        .route("/review/close", post(close_session))
        .route("/download", get(download_workbook))
        .route("/api/state", get(get_state))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

pub async fn run(config: ReviewConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(config)?);

    // Sweep abandoned sessions; their edits are discarded with them
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            tick.tick().await;
            let removed = sweeper.sessions.purge_expired();
            if removed > 0 {
                info!("Discarded {} expired review session(s)", removed);
            }
        }
    });

    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    println!("Listening on http://{}", bind);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn render(state: &AppState, template: &str, data: &serde_json::Value) -> Response {
    match state.templates.render(template, data) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Failed to render {}: {}", template, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

fn redirect_with_error(message: &str) -> Response {
    Redirect::to(&format!("/?error={}", urlencoding::encode(message))).into_response()
}

fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

fn start_session(state: &AppState, jar: CookieJar, session: ReviewSession) -> Response {
    if let Some(old) = session_id(&jar) {
        state.sessions.remove(&old);
    }
    let id = state.sessions.insert(session);
    let cookie = Cookie::build((SESSION_COOKIE, id)).path("/").http_only(true);
    (jar.add(cookie), Redirect::to("/review")).into_response()
}

/// Launches the next case's studio link on the reviewer's machine.
fn open_link(step: &Step) {
    if let Some(link) = &step.open_link {
        if let Err(e) = open::that_detached(link) {
            warn!("Could not open studio link {}: {}", link, e);
        }
    }
}

async fn serve_landing(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LandingQuery>,
) -> Response {
    let config = &state.config;
    let (workbooks, listing_error) = match list_workbooks(&config.workflow_dir, &config.file_pattern)
    {
        Ok(names) => (names, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    render(
        &state,
        "landing",
        &json!({
            "workflow_dir": config.workflow_dir.display().to_string(),
            "workbooks": workbooks,
            "listing_error": listing_error,
            "error": query.error,
            "in_place": config.navigator.persistence == Persistence::InPlace,
        }),
    )
}

async fn upload_workbook(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Response {
    let mut file_data = Bytes::new();
    let mut file_name = String::from("workbook.xlsx");

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("workbook") {
            if let Some(name) = field.file_name().filter(|n| !n.is_empty()) {
                file_name = name.to_string();
            }
            match field.bytes().await {
                Ok(bytes) => file_data = bytes,
                Err(e) => return redirect_with_error(&format!("Upload failed: {}", e)),
            }
        }
    }

    if file_data.is_empty() {
        return redirect_with_error("No file data received");
    }

    match load_from_bytes(&file_data, &state.config.case_sheet) {
        Ok(loaded) => {
            info!("Uploaded {} ({} bytes)", file_name, file_data.len());
            let session =
                ReviewSession::open(loaded, Source::Upload { file_name }, &state.config);
            start_session(&state, jar, session)
        }
        Err(e) => redirect_with_error(&e.to_string()),
    }
}

async fn open_workbook(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<OpenForm>,
) -> Response {
    let config = &state.config;
    let loaded = resolve_workbook(&config.workflow_dir, &config.file_pattern, &form.file)
        .and_then(|path| load_from_path(&path, &config.case_sheet).map(|l| (path, l)));

    match loaded {
        Ok((path, loaded)) => {
            let session = ReviewSession::open(loaded, Source::Directory { path }, config);
            start_session(&state, jar, session)
        }
        Err(e) => redirect_with_error(&e.to_string()),
    }
}

fn review_context(session: &mut ReviewSession, login_tab: bool, state: &AppState) -> serde_json::Value {
    let notice = session.take_notice().or_else(|| session.notice());
    let progress = session.progress();
    let case = session.current_case().map(|case| {
        json!({
            "number": case.number,
            "total": case.total,
            "accession": case.accession,
            "studio_link": case.studio_link,
            "completed": case.completed,
            "is_tp": case.fields.classification == Classification::TP,
            "is_fp": case.fields.classification == Classification::FP,
            "second_opinion": case.fields.second_opinion,
            "report_yes": case.fields.request_report,
            "location_type": case.fields.location_type,
            "comment": case.fields.comment,
        })
    });

    json!({
        "file_name": session.source().display_name(),
        "progress": progress,
        "case": case,
        "editable": session.cursor().active().is_some(),
        "notice": notice.map(|n| n.to_string()),
        "notice_success": notice.is_some_and(|n| n.is_success()),
        "can_download": !session.is_empty(),
        "in_place": session.persistence() == Persistence::InPlace,
        "login_tab": login_tab,
        "login": state.config.login_info,
    })
}

async fn serve_review(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<ReviewQuery>,
) -> Response {
    let Some(id) = session_id(&jar) else {
        return Redirect::to("/").into_response();
    };
    let login_tab = query.tab.as_deref() == Some("login");
    match state
        .sessions
        .with(&id, |session| review_context(session, login_tab, &state))
    {
        Ok(data) => render(&state, "review", &data),
        Err(e) => redirect_with_error(&e.to_string()),
    }
}

async fn previous_case(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    navigate(&state, &jar, ReviewSession::previous)
}

async fn next_case(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    navigate(&state, &jar, ReviewSession::next)
}

fn navigate(state: &AppState, jar: &CookieJar, go: fn(&mut ReviewSession) -> Step) -> Response {
    let Some(id) = session_id(jar) else {
        return Redirect::to("/").into_response();
    };
    match state.sessions.with(&id, go) {
        Ok(_) => Redirect::to("/review").into_response(),
        Err(e) => redirect_with_error(&e.to_string()),
    }
}

fn submit_failed(e: ReviewError) -> Response {
    error!("Submit failed: {}", e);
    let status = match e {
        ReviewError::StaleSubmit => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

async fn submit_case(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ReviewForm>,
) -> Response {
    let Some(id) = session_id(&jar) else {
        return Redirect::to("/").into_response();
    };
    let fields = form.fields();
    let mut pending = match state.sessions.with(&id, |session| session.prepare_submit(&fields)) {
        Ok(Ok(pending)) => pending,
        Ok(Err(e)) => return submit_failed(e),
        Err(e) => return redirect_with_error(&e.to_string()),
    };

    // Write the source file without holding the session lock
    if let Some((path, bytes)) = pending.take_save() {
        let saved = tokio::task::spawn_blocking(move || save_in_place(&path, &bytes)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return submit_failed(e),
            Err(e) => {
                error!("Save task failed: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Save failed").into_response();
            }
        }
    }

    match state.sessions.with(&id, |session| session.commit(pending)) {
        Ok(Ok(step)) => {
            open_link(&step);
            Redirect::to("/review").into_response()
        }
        Ok(Err(e)) => submit_failed(e),
        Err(e) => redirect_with_error(&e.to_string()),
    }
}

async fn edit_case(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ReviewForm>,
) -> StatusCode {
    let Some(id) = session_id(&jar) else {
        return StatusCode::UNAUTHORIZED;
    };
    let fields = form.fields();
    match state.sessions.with(&id, |session| session.edit(fields)) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::UNAUTHORIZED,
    }
}

async fn close_session(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(id) = session_id(&jar) {
        state.sessions.remove(&id);
    }
    let cookie = Cookie::build(SESSION_COOKIE).path("/");
    (jar.remove(cookie), Redirect::to("/")).into_response()
}

/// ASCII-only fallback for the plain `filename` parameter.
fn ascii_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn download_workbook(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(id) = session_id(&jar) else {
        return Redirect::to("/").into_response();
    };
    let exported = state
        .sessions
        .with(&id, |session| session.export().map(|b| (b, session.download_name())));

    match exported {
        Ok(Ok((bytes, name))) => {
            info!("Prepared download {} ({} bytes)", name, bytes.len());
            let disposition = format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                ascii_file_name(&name),
                urlencoding::encode(&name)
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, XLSX_MIME.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Ok(Err(e @ ReviewError::EmptyDataset(_))) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Ok(Err(e)) => {
            error!("Download failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => redirect_with_error(&e.to_string()),
    }
}

async fn get_state(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(id) = session_id(&jar) else {
        return (StatusCode::UNAUTHORIZED, "No review session").into_response();
    };
    let snapshot = state.sessions.with(&id, |session| {
        json!({
            "file_name": session.source().display_name(),
            "cursor": session.cursor(),
            "progress": session.progress(),
            "case": session.current_case(),
            "notice": session.notice(),
        })
    });
    match snapshot {
        Ok(data) => Json(data).into_response(),
        Err(e) => (StatusCode::UNAUTHORIZED, e.to_string()).into_response(),
    }
}
