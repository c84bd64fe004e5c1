//! Installation front end.
//!
//! Takes a workspace through Slack's OAuth v2 flow, then asks which channel
//! the updates should go to.  Once a channel is selected the installation is
//! saved and handed to the runtime, which launches its session.

pub mod oauth_state;
pub mod pages;

use axum::{
    Form, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::mpsc::UnboundedSender};
use tracing::{error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Installation, Res, Void},
    },
    runtime::Runtime,
    service::{chat::ChatClient, db::InstallationStore},
};

use oauth_state::OAuthStateStore;

/// Slack's OAuth v2 authorization page.
const AUTHORIZE_URL: &str = "https://slack.com/oauth/v2/authorize";

// Structs.

/// Shared state for the front end handlers.
///
/// Trivially cloneable.
#[derive(Clone)]
pub struct FrontendState {
    pub config: Config,
    pub store: InstallationStore,
    pub chat: ChatClient,
    pub oauth_states: OAuthStateStore,
    /// Receives every installation that just selected its channel.
    pub ready: UnboundedSender<Installation>,
}

impl FrontendState {
    pub fn new(runtime: &Runtime, ready: UnboundedSender<Installation>) -> Self {
        Self {
            config: runtime.config.clone(),
            store: runtime.store.clone(),
            chat: runtime.chat.clone(),
            oauth_states: OAuthStateStore::new(runtime.config.oauth_state_expiration()),
            ready,
        }
    }
}

/// Query parameters Slack sends back to the redirect URI.
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// The channel selection form.
#[derive(Debug, Deserialize)]
pub struct ChannelSelection {
    team_id: String,
    channel_id: String,
    /// The one-time token issued with the form.
    token: String,
}

/// Error type for handlers: logged, and answered with a 500.
struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong. Please try again.").into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

// Router.

/// Build the front end router.
pub fn router(state: FrontendState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/install", get(install))
        .route("/slack/oauth_redirect", get(oauth_redirect))
        .route("/slack/select_channel", post(select_channel))
        .with_state(state)
}

/// Serve the front end on `listener` until it fails.
pub async fn serve(listener: TcpListener, state: FrontendState) -> Void {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// Handlers.

async fn health() -> &'static str {
    "ok"
}

/// Start the OAuth flow.
#[instrument(skip_all)]
async fn install(State(state): State<FrontendState>) -> Result<Redirect, AppError> {
    let url = authorize_url(&state.config, &state.oauth_states.issue())?;
    Ok(Redirect::to(url.as_str()))
}

/// Finish the OAuth flow and ask for a channel.
#[instrument(skip_all)]
async fn oauth_redirect(State(state): State<FrontendState>, Query(callback): Query<OAuthCallback>) -> Result<Response, AppError> {
    if !callback.state.as_deref().is_some_and(|s| state.oauth_states.consume(s)) {
        warn!("Rejected OAuth callback with an invalid state");
        return Ok((StatusCode::BAD_REQUEST, "Invalid state").into_response());
    }

    let Some(code) = callback.code else {
        warn!("OAuth callback without a code: {:?}", callback.error);
        return Ok((StatusCode::BAD_REQUEST, "Missing code").into_response());
    };

    let installation = state.chat.exchange_code(&code).await?;
    state.store.save(&installation).await?;

    info!("Saved installation for team {}", installation.team_id);

    let channels = state.chat.list_channels(&installation).await?;
    let token = state.oauth_states.issue_for_team(&installation.team_id);

    Ok(Html(pages::select_channel(&installation.team_id, &token, &channels)?).into_response())
}

/// Record the selected channel and launch the installation's session.
#[instrument(skip_all, fields(team_id = %selection.team_id))]
async fn select_channel(State(state): State<FrontendState>, Form(selection): Form<ChannelSelection>) -> Result<Response, AppError> {
    if !state.oauth_states.consume_for_team(&selection.token, &selection.team_id) {
        warn!("Rejected channel selection with an invalid token");
        return Ok((StatusCode::FORBIDDEN, "Invalid token").into_response());
    }

    let Some(installation) = state.store.find_by_team(&selection.team_id).await? else {
        warn!("Channel selected for an unknown team");
        return Ok((StatusCode::NOT_FOUND, "Unknown installation").into_response());
    };

    let installation = installation.with_channel(selection.channel_id);
    state.store.save(&installation).await?;

    info!("Team selected channel {:?}", installation.channel_id);

    state.ready.send(installation).map_err(|_| anyhow::anyhow!("The session launcher is gone."))?;

    Ok(pages::INSTALLATION_COMPLETE.into_response())
}

// Helpers.

/// The Slack authorization URL for a given state.
fn authorize_url(config: &Config, state: &str) -> Res<reqwest::Url> {
    let scopes = config.scopes().join(",");

    let mut params = vec![("client_id", config.slack_client_id.as_str()), ("scope", scopes.as_str()), ("user_scope", ""), ("state", state)];

    if let Some(redirect_uri) = &config.slack_redirect_uri {
        params.push(("redirect_uri", redirect_uri.as_str()));
    }

    Ok(reqwest::Url::parse_with_params(AUTHORIZE_URL, &params)?)
}

// Tests.
