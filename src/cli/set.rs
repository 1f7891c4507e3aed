use anyhow::{anyhow, bail, Result};

use prefsync::config::PrefsyncConfig;
use prefsync::prefs::controller::HydrationOutcome;
use prefsync::prefs::types::{PreferenceEdit, RagScope, SearchPolicy};

/// Apply one edit to a session and persist it.
pub async fn set(config: &PrefsyncConfig, session: &str, field: &str, value: &str) -> Result<()> {
    let edit = parse_edit(field, value)?;

    let mut sync = super::open_sync(config)?;
    let report = sync.activate(Some(session)).await;
    if let Some(HydrationOutcome::Failed) = report.hydration {
        bail!("could not load preferences for session {session}");
    }

    let report = sync.edit(edit).await;
    if report.persisted {
        println!("Saved.");
    } else if sync.controller().last_persisted() == Some(sync.controller().canonical().as_str()) {
        println!("No change.");
    } else {
        bail!("write to the preference store failed");
    }
    super::print_preferences(sync.current());
    Ok(())
}

/// Turn a `field value` pair from the command line into an edit.
fn parse_edit(field: &str, value: &str) -> Result<PreferenceEdit> {
    let ids = || -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    };
    let edit = match field {
        "libraries" => PreferenceEdit::DocumentLibraries(ids()),
        "prompts" => PreferenceEdit::PromptResources(ids()),
        "templates" => PreferenceEdit::TemplateResources(ids()),
        "policy" => PreferenceEdit::SearchPolicy(value.parse::<SearchPolicy>().map_err(|e| anyhow!(e))?),
        "scope" => PreferenceEdit::RagScope(
            RagScope::parse_lenient(value).ok_or_else(|| anyhow!("invalid retrieval scope: {value}"))?,
        ),
        "deep-search" => PreferenceEdit::DeepSearch(match value {
            "on" | "true" | "1" => true,
            "off" | "false" | "0" => false,
            other => bail!("expected on/off, got {other}"),
        }),
        "agent" => {
            let agent = value.trim();
            if agent.is_empty() {
                bail!("agent name must not be empty");
            }
            PreferenceEdit::Agent(agent.to_string())
        }
        other => bail!(
            "unknown field {other}; expected one of libraries, prompts, templates, policy, scope, deep-search, agent"
        ),
    };
    Ok(edit)
}
