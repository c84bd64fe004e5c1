//! HTML rendered by the installation front end.

use minijinja::{Environment, context};

use crate::base::types::{ChannelSummary, Res};

/// Shown once a channel has been selected.
pub const INSTALLATION_COMPLETE: &str = "Installation successful! The bot will post updates to the selected channel.";

/// The `.html` suffix turns on auto-escaping.
const SELECT_CHANNEL_NAME: &str = "select_channel.html";

const SELECT_CHANNEL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Select a channel</title>
</head>
<body>
    <h1>Where should Pepito's updates go?</h1>
    <form action="/slack/select_channel" method="post">
        <input type="hidden" name="team_id" value="{{ team_id }}">
        <input type="hidden" name="token" value="{{ token }}">
        <select name="channel_id">
{%- for channel in channels %}
            <option value="{{ channel.id }}">#{{ channel.name }}</option>
{%- endfor %}
        </select>
        <button type="submit">Select channel</button>
    </form>
</body>
</html>
"#;

/// The channel selection form shown after a workspace authorizes the app.
///
/// `token` is the one-time selection token the form posts back.
pub fn select_channel(team_id: &str, token: &str, channels: &[ChannelSummary]) -> Res<String> {
    let mut env = Environment::new();
    env.add_template(SELECT_CHANNEL_NAME, SELECT_CHANNEL_TEMPLATE)?;

    let page = env.get_template(SELECT_CHANNEL_NAME)?.render(context! { team_id, token, channels })?;

    Ok(page)
}

// Tests.
