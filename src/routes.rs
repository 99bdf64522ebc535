use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;

use crate::db::Database;
use crate::domain::{self, Feed, FeedId, FeedSummary, NewSource};
use crate::error::Error;

pub struct AppState {
    pub db: Arc<Database>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/dashboard.html", get(dashboard))
        .route("/create_feed.html", get(create_feed_form).post(create_feed))
        .route("/feeds/:feed_id/manage.html", get(manage_feed))
        .route("/feeds/:feed_id/sources", post(add_source))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn manage_url(feed_id: FeedId) -> String {
    format!("/feeds/{}/manage.html", feed_id)
}

// Template structs
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub feeds: Vec<FeedSummary>,
}

#[derive(Template)]
#[template(path = "create_feed.html")]
pub struct CreateFeedTemplate {
    pub error: Option<String>,
    pub name: String,
}

#[derive(Template)]
#[template(path = "manage.html")]
pub struct ManageTemplate {
    pub feed: Feed,
    pub error: Option<String>,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

// Anything that reaches here is either a missing feed or a defect.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(Error::NotFound(msg)) = self.0.downcast_ref::<Error>() {
            return (StatusCode::NOT_FOUND, msg.clone()).into_response();
        }

        error!("Request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

// Route handlers
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db.acquire().await?;
    let feeds = domain::get_feeds(&mut conn).await?;
    Ok(HtmlTemplate(DashboardTemplate { feeds }))
}

pub async fn create_feed_form() -> impl IntoResponse {
    HtmlTemplate(CreateFeedTemplate {
        error: None,
        name: String::new(),
    })
}

#[derive(Deserialize)]
pub struct CreateFeedForm {
    pub name: String,
}

pub async fn create_feed(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CreateFeedForm>,
) -> Result<Response, AppError> {
    let mut conn = state.db.acquire().await?;

    match domain::create_feed(&mut conn, &form.name).await {
        Ok(feed) => Ok(Redirect::to(&manage_url(feed.id)).into_response()),
        Err(err) if err.is_domain() => Ok(HtmlTemplate(CreateFeedTemplate {
            error: Some(err.to_string()),
            name: form.name,
        })
        .into_response()),
        Err(err) => Err(err.into()),
    }
}

pub async fn manage_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<FeedId>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db.acquire().await?;
    let feed = domain::get_feed_by_id(&mut conn, feed_id).await?;
    Ok(HtmlTemplate(ManageTemplate { feed, error: None }))
}

#[derive(Deserialize)]
pub struct AddSourceForm {
    pub name: String,
    pub url: String,
    pub update_frequency: i64,
}

pub async fn add_source(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<FeedId>,
    Form(form): Form<AddSourceForm>,
) -> Result<Response, AppError> {
    let mut conn = state.db.acquire().await?;

    let new = NewSource {
        name: form.name,
        url: form.url,
        update_frequency: form.update_frequency,
        feed_id,
    };

    match domain::create_source(&mut conn, new).await {
        // Post/Redirect/Get so a reload does not resubmit the form.
        Ok(_) => Ok(Redirect::to(&manage_url(feed_id)).into_response()),
        Err(err) if err.is_domain() => {
            let feed = domain::get_feed_by_id(&mut conn, feed_id).await?;
            Ok(HtmlTemplate(ManageTemplate {
                feed,
                error: Some(err.to_string()),
            })
            .into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
