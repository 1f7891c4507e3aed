use anyhow::{bail, Result};

use prefsync::config::PrefsyncConfig;
use prefsync::prefs::controller::HydrationOutcome;
use prefsync::store::PreferenceServer;

/// Hydrate a session and print what the UI would show.
///
/// Hydrating a session with no server record performs the first write, just
/// like opening the conversation in a client would.
pub async fn show(config: &PrefsyncConfig, session: &str, json: bool) -> Result<()> {
    let mut sync = super::open_sync(config)?;
    let report = sync.activate(Some(session)).await;

    if let Some(HydrationOutcome::Failed) = report.hydration {
        bail!("could not load preferences for session {session}");
    }

    if json {
        let record = sync.server().fetch_preferences(session).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Session {session}");
    println!("{}", "=".repeat(40));
    super::print_preferences(sync.current());
    if report.persisted {
        println!();
        println!("(no stored record; defaults were written)");
    }
    Ok(())
}
