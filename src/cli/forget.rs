use anyhow::Result;

use prefsync::config::PrefsyncConfig;

/// Remove every trace of a deleted conversation.
pub async fn forget(config: &PrefsyncConfig, session: &str) -> Result<()> {
    let mut sync = super::open_sync(config)?;
    if sync.forget(session).await? {
        println!("Forgot session {session}");
    } else {
        println!("Nothing stored for session {session}");
    }
    Ok(())
}
