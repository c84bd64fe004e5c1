#![cfg(test)]

mod common;

use std::{sync::Arc, time::Duration};

use common::{MockChat, installation, test_config};
use pepito_bot::{
    base::types::{ChannelSummary, Installation},
    frontend::{self, FrontendState, oauth_state::OAuthStateStore, pages},
    service::{chat::ChatClient, db::InstallationStore},
};
use reqwest::{StatusCode, redirect::Policy};
use tokio::{net::TcpListener, sync::mpsc};

/// A running front end and the handles a test needs to poke at it.
struct Frontend {
    base: String,
    http: reqwest::Client,
    store: InstallationStore,
    oauth_states: OAuthStateStore,
    ready: mpsc::UnboundedReceiver<Installation>,
}

async fn spawn_frontend(chat: MockChat) -> Frontend {
    let store = InstallationStore::surreal_memory().await.unwrap();
    let oauth_states = OAuthStateStore::new(Duration::from_secs(60));
    let (ready_tx, ready) = mpsc::unbounded_channel();

    let state = FrontendState {
        config: test_config("http://localhost/events"),
        store: store.clone(),
        chat: ChatClient::new(Arc::new(chat)),
        oauth_states: oauth_states.clone(),
        ready: ready_tx,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(frontend::serve(listener, state));

    let http = reqwest::Client::builder().redirect(Policy::none()).build().unwrap();

    Frontend {
        base,
        http,
        store,
        oauth_states,
        ready,
    }
}

async fn select(frontend: &Frontend, form: &[(&str, &str)]) -> reqwest::Response {
    frontend.http.post(format!("{}/slack/select_channel", frontend.base)).form(form).send().await.unwrap()
}

/// Pull the selection token out of the channel form.
fn form_token(page: &str) -> String {
    let marker = r#"name="token" value=""#;
    let start = page.find(marker).unwrap() + marker.len();
    let end = start + page[start..].find('"').unwrap();

    page[start..end].to_string()
}

#[tokio::test]
async fn health_answers_ok() {
    let frontend = spawn_frontend(MockChat::new()).await;

    let response = frontend.http.get(format!("{}/health", frontend.base)).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn install_redirects_to_slack_with_a_fresh_state() {
    let frontend = spawn_frontend(MockChat::new()).await;

    let response = frontend.http.get(format!("{}/slack/install", frontend.base)).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response.headers()["location"].to_str().unwrap();
    let url = reqwest::Url::parse(location).unwrap();
    let state = url.query_pairs().find(|(k, _)| k == "state").map(|(_, v)| v.into_owned()).unwrap();

    assert_eq!(url.host_str(), Some("slack.com"));
    assert!(url.query_pairs().any(|(k, v)| k == "client_id" && v == "123.456"));

    // The state in the redirect is one the front end will accept.
    assert!(frontend.oauth_states.consume(&state));
}

#[tokio::test]
async fn oauth_redirect_rejects_unknown_state() {
    let mut chat = MockChat::new();
    chat.expect_exchange_code().never();
    let frontend = spawn_frontend(chat).await;

    let response = frontend.http.get(format!("{}/slack/oauth_redirect?code=abc&state=forged", frontend.base)).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Invalid state");
}

#[tokio::test]
async fn oauth_redirect_requires_a_code() {
    let mut chat = MockChat::new();
    chat.expect_exchange_code().never();
    let frontend = spawn_frontend(chat).await;
    let state = frontend.oauth_states.issue();

    let response = frontend
        .http
        .get(format!("{}/slack/oauth_redirect?error=access_denied&state={state}", frontend.base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Missing code");
}

#[tokio::test]
async fn oauth_flow_saves_the_installation_and_selects_a_channel() {
    let mut chat = MockChat::new();
    chat.expect_exchange_code()
        .withf(|code| code == "the-code")
        .times(1)
        .returning(|_| Ok(Installation::new("T1", "xoxb-T1")));
    chat.expect_list_channels().withf(|installation| installation.team_id == "T1").times(1).returning(|_| {
        Ok(vec![ChannelSummary {
            id: "C1".to_string(),
            name: "cats".to_string(),
        }])
    });
    let mut frontend = spawn_frontend(chat).await;
    let state = frontend.oauth_states.issue();
    let url = format!("{}/slack/oauth_redirect?code=the-code&state={state}", frontend.base);

    let response = frontend.http.get(&url).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = response.text().await.unwrap();
    assert!(page.contains(r#"<option value="C1">#cats</option>"#));

    let saved = frontend.store.find_by_team("T1").await.unwrap().unwrap();
    assert_eq!(saved.bot_token, "xoxb-T1");
    assert_eq!(saved.channel_id, None);

    // States are single use.
    let replay = frontend.http.get(&url).send().await.unwrap();
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);

    // The form carries the token that authorizes the selection.
    let token = form_token(&page);
    let response = select(&frontend, &[("team_id", "T1"), ("channel_id", "C1"), ("token", token.as_str())]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(frontend.ready.try_recv().unwrap(), installation("T1", "C1"));
}

#[tokio::test]
async fn selecting_a_channel_saves_it_and_launches_the_session() {
    let mut frontend = spawn_frontend(MockChat::new()).await;
    frontend.store.save(&Installation::new("T1", "xoxb-T1")).await.unwrap();
    let token = frontend.oauth_states.issue_for_team("T1");

    let response = select(&frontend, &[("team_id", "T1"), ("channel_id", "C7"), ("token", token.as_str())]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), pages::INSTALLATION_COMPLETE);

    let saved = frontend.store.find_by_team("T1").await.unwrap().unwrap();
    assert_eq!(saved, installation("T1", "C7"));

    let launched = frontend.ready.try_recv().unwrap();
    assert_eq!(launched, installation("T1", "C7"));
}

#[tokio::test]
async fn selecting_a_channel_for_an_unknown_team_is_not_found() {
    let mut frontend = spawn_frontend(MockChat::new()).await;
    let token = frontend.oauth_states.issue_for_team("T404");

    let response = select(&frontend, &[("team_id", "T404"), ("channel_id", "C1"), ("token", token.as_str())]).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(frontend.ready.try_recv().is_err());
    assert_eq!(frontend.store.find_by_team("T404").await.unwrap(), None);
}

#[tokio::test]
async fn selecting_a_channel_requires_the_team_token() {
    let mut frontend = spawn_frontend(MockChat::new()).await;
    frontend.store.save(&installation("T1", "C1")).await.unwrap();
    let other_team = frontend.oauth_states.issue_for_team("T2");

    for token in ["forged", other_team.as_str()] {
        let response = select(&frontend, &[("team_id", "T1"), ("channel_id", "C-hijack"), ("token", token)]).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    assert!(frontend.ready.try_recv().is_err());
    assert_eq!(frontend.store.find_by_team("T1").await.unwrap(), Some(installation("T1", "C1")));
}
