use anyhow::Result;

use prefsync::config::PrefsyncConfig;
use prefsync::prefs::binding::BindingOutcome;
use prefsync::prefs::types::PreferenceEdit;

/// Simulate a new conversation: pick an agent in the draft, then assign the
/// session identifier and bind.
pub async fn bind(config: &PrefsyncConfig, session: Option<&str>, agent: Option<&str>) -> Result<()> {
    let mut sync = super::open_sync(config)?;

    if let Some(agent) = agent.map(str::trim).filter(|a| !a.is_empty()) {
        sync.edit(PreferenceEdit::Agent(agent.to_string())).await;
    }

    let session_id = match session {
        Some(id) => id.to_string(),
        None => uuid::Uuid::now_v7().to_string(),
    };

    let (outcome, _report) = sync.session_assigned(&session_id).await?;

    println!("Session {session_id}");
    match &outcome {
        BindingOutcome::BoundDraft { agent } => println!("  Bound draft agent {agent}"),
        BindingOutcome::BoundDefault { agent } => println!("  Bound default agent {agent}"),
        BindingOutcome::OverrodeDefault { previous, agent } => {
            println!("  Replaced default {previous} with {agent}")
        }
        BindingOutcome::KeptExisting { agent } => println!("  Kept existing agent {agent}"),
    }
    super::print_preferences(sync.current());
    Ok(())
}
