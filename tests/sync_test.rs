mod helpers;

use helpers::{harness, CUSTOM_AGENT, PLAIN_AGENT, RESEARCH_AGENT};
use prefsync::prefs::binding::{AgentBindingStore, BindingOutcome};
use prefsync::prefs::controller::{HydrationOutcome, ReadBackOutcome};
use prefsync::prefs::hydration::SessionPhase;
use prefsync::prefs::types::{PreferenceEdit, RagScope, SearchPolicy, DEFAULT_AGENT};
use prefsync::sync::SyncReport;
use serde_json::json;

#[tokio::test]
async fn first_visit_writes_defaults_exactly_once() {
    let mut h = harness();
    let report = h.sync.activate(Some("s1")).await;

    assert_eq!(
        report.hydration,
        Some(HydrationOutcome::Applied { server_had_record: false })
    );
    assert!(report.persisted);
    assert_eq!(report.read_back, Some(ReadBackOutcome::Applied));
    assert_eq!(h.server.write_count(), 1);
    assert_eq!(
        h.server.record("s1").unwrap(),
        json!({
            "agentName": "assistant-default",
            "deepSearch": false,
            "documentLibraryIds": [],
            "promptResourceIds": [],
            "searchPolicy": "hybrid",
            "searchRagScope": "hybrid",
            "templateResourceIds": []
        })
    );

    // Re-selecting the active session is a no-op
    let fetches = h.server.fetch_count();
    assert_eq!(h.sync.activate(Some("s1")).await, SyncReport::default());
    assert_eq!(h.server.fetch_count(), fetches);
    assert_eq!(h.server.write_count(), 1);
}

#[tokio::test]
async fn existing_record_is_applied_without_rewriting() {
    let mut h = harness();
    h.server
        .insert_record("s1", json!({ "searchPolicy": "strict", "documentLibraryIds": ["handbook"] }));

    let report = h.sync.activate(Some("s1")).await;
    assert_eq!(
        report.hydration,
        Some(HydrationOutcome::Applied { server_had_record: true })
    );
    assert!(!report.persisted);
    assert_eq!(h.server.write_count(), 0);
    assert_eq!(h.sync.current().search_policy, SearchPolicy::Strict);
    assert_eq!(h.sync.current().document_library_ids, vec!["handbook"]);
}

#[tokio::test]
async fn edit_is_written_and_read_back() {
    let mut h = harness();
    h.sync.activate(Some("s1")).await;

    let report = h
        .sync
        .edit(PreferenceEdit::DocumentLibraries(vec![
            "handbook".into(),
            "faq".into(),
            "handbook".into(),
        ]))
        .await;
    assert!(report.persisted);
    assert_eq!(report.read_back, Some(ReadBackOutcome::Applied));
    assert_eq!(h.server.write_count(), 2);
    assert_eq!(
        h.server.record("s1").unwrap()["documentLibraryIds"],
        json!(["handbook", "faq"])
    );
    assert_eq!(h.sync.current().document_library_ids, vec!["handbook", "faq"]);
}

#[tokio::test]
async fn edits_that_change_nothing_issue_no_writes() {
    let mut h = harness();
    h.sync.activate(Some("s1")).await;
    assert_eq!(h.server.write_count(), 1);

    let report = h.sync.edit(PreferenceEdit::SearchPolicy(SearchPolicy::Hybrid)).await;
    assert!(!report.persisted);
    let report = h.sync.edit(PreferenceEdit::DocumentLibraries(Vec::new())).await;
    assert!(!report.persisted);

    assert_eq!(h.server.write_count(), 1);
}

#[tokio::test]
async fn fields_the_agent_does_not_support_are_not_sent() {
    let mut h = harness();
    h.server.insert_record("s1", json!({ "agentName": PLAIN_AGENT }));
    h.sync.activate(Some("s1")).await;

    assert!(!h.sync.edit(PreferenceEdit::RagScope(RagScope::CorpusOnly)).await.persisted);
    assert!(!h.sync.edit(PreferenceEdit::DeepSearch(true)).await.persisted);
    assert_eq!(h.server.write_count(), 0);

    assert!(h.sync.edit(PreferenceEdit::SearchPolicy(SearchPolicy::Strict)).await.persisted);
    let (_, payload) = h.server.writes().pop().unwrap();
    assert_eq!(payload["searchPolicy"], "strict");
    assert!(payload.get("searchRagScope").is_none());
    assert!(payload.get("deepSearch").is_none());
}

#[tokio::test]
async fn legacy_scope_encodings_hydrate_as_current_values() {
    let mut h = harness();
    h.server.insert_record("old-flag", json!({ "skip_rag_search": true }));
    h.server.insert_record("old-key", json!({ "ragScope": "corpus" }));

    h.sync.activate(Some("old-flag")).await;
    assert_eq!(h.sync.current().search_rag_scope, RagScope::GeneralOnly);

    h.sync.activate(Some("old-key")).await;
    assert_eq!(h.sync.current().search_rag_scope, RagScope::CorpusOnly);

    // Both records carried an opinion, so neither was rewritten on load
    assert_eq!(h.server.write_count(), 0);
}

#[tokio::test]
async fn failed_write_is_retried_on_flush() {
    let mut h = harness();
    h.server.insert_record("s1", json!({ "searchPolicy": "semantic" }));
    h.sync.activate(Some("s1")).await;

    h.server.set_fail_writes(true);
    let report = h.sync.edit(PreferenceEdit::DeepSearch(true)).await;
    assert!(!report.persisted);
    assert!(h.sync.current().deep_search, "UI keeps the local value");

    h.server.set_fail_writes(false);
    let report = h.sync.flush().await;
    assert!(report.persisted);
    assert_eq!(h.server.record("s1").unwrap()["deepSearch"], true);
    assert!(!h.sync.flush().await.persisted);
}

#[tokio::test]
async fn failed_first_write_stays_forced() {
    let mut h = harness();
    h.server.set_fail_writes(true);
    let report = h.sync.activate(Some("s1")).await;
    assert!(!report.persisted);
    assert!(h.server.record("s1").is_none());

    h.server.set_fail_writes(false);
    assert!(h.sync.flush().await.persisted);
    assert_eq!(h.server.write_count(), 1);
}

#[tokio::test]
async fn failed_fetch_waits_and_holds_edits_for_that_session() {
    let mut h = harness();
    h.server.set_fail_fetches(true);

    let report = h.sync.activate(Some("s1")).await;
    assert_eq!(report.hydration, Some(HydrationOutcome::Failed));
    assert!(matches!(
        h.sync.controller().phase(),
        SessionPhase::AwaitingServer { .. }
    ));

    let report = h.sync.edit(PreferenceEdit::DeepSearch(true)).await;
    assert!(!report.persisted, "nothing is written before hydration");
    assert_eq!(h.server.write_count(), 0);

    h.server.set_fail_fetches(false);
    let report = h.sync.retry_fetch().await;
    assert_eq!(
        report.hydration,
        Some(HydrationOutcome::Applied { server_had_record: false })
    );
    assert!(report.persisted);
    assert_eq!(h.server.record("s1").unwrap()["deepSearch"], true);
}

#[tokio::test]
async fn switching_back_refetches_the_session() {
    let mut h = harness();
    h.server.insert_record("s1", json!({ "searchPolicy": "strict" }));

    h.sync.activate(Some("s1")).await;
    h.sync.activate(Some("s2")).await;
    assert_eq!(h.sync.current().search_policy, SearchPolicy::Hybrid);

    let fetches = h.server.fetch_count();
    let report = h.sync.activate(Some("s1")).await;
    assert!(matches!(report.hydration, Some(HydrationOutcome::Applied { .. })));
    assert_eq!(h.server.fetch_count(), fetches + 1);
    assert_eq!(h.sync.current().search_policy, SearchPolicy::Strict);
}

#[tokio::test]
async fn unavailable_cache_is_not_fatal() {
    let mut h = harness();
    h.cache.set_unavailable(true);

    let report = h.sync.activate(Some("s1")).await;
    assert!(matches!(report.hydration, Some(HydrationOutcome::Applied { .. })));
    assert!(report.persisted);
    assert!(h.sync.edit(PreferenceEdit::DeepSearch(true)).await.persisted);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn agent_change_on_live_session_updates_binding() {
    let mut h = harness();
    h.sync.activate(Some("s1")).await;

    let report = h.sync.edit(PreferenceEdit::Agent(RESEARCH_AGENT.into())).await;
    assert!(report.persisted);
    assert_eq!(
        h.bindings.bound_agent("s1").unwrap().as_deref(),
        Some(RESEARCH_AGENT)
    );
    assert_eq!(h.server.record("s1").unwrap()["agentName"], RESEARCH_AGENT);
}

#[tokio::test]
async fn forget_removes_every_trace() {
    let mut h = harness();
    h.sync.session_assigned("s1").await.unwrap();
    assert!(h.server.record("s1").is_some());
    assert!(h.cache.raw("prefsync:s1").is_some());

    assert!(h.sync.forget("s1").await.unwrap());
    assert!(h.server.record("s1").is_none());
    assert!(h.bindings.is_empty());
    assert!(h.cache.raw("prefsync:s1").is_none());
    assert_eq!(h.sync.controller().active_session(), None);

    assert!(!h.sync.forget("s1").await.unwrap());
}

#[tokio::test]
async fn edits_made_while_loading_do_not_follow_a_switch() {
    let mut h = harness();
    h.sync.activate(Some("A")).await;

    h.server.set_fail_fetches(true);
    let report = h.sync.activate(Some("B")).await;
    assert_eq!(report.hydration, Some(HydrationOutcome::Failed));
    h.sync
        .edit(PreferenceEdit::DocumentLibraries(vec!["meant-for-B".into()]))
        .await;

    h.server.set_fail_fetches(false);
    let report = h.sync.activate(Some("C")).await;
    assert!(matches!(report.hydration, Some(HydrationOutcome::Applied { .. })));
    assert!(h.sync.current().document_library_ids.is_empty());
    assert_eq!(h.server.record("C").unwrap()["documentLibraryIds"], json!([]));

    h.sync.activate(Some("B")).await;
    assert!(h.sync.current().document_library_ids.is_empty());
    assert_eq!(h.server.record("B").unwrap()["documentLibraryIds"], json!([]));
}

#[tokio::test]
async fn draft_choices_only_reach_the_assigned_session() {
    let mut h = harness();
    h.server.insert_record("old", json!({ "searchPolicy": "semantic" }));
    h.sync.edit(PreferenceEdit::DeepSearch(true)).await;
    h.sync.edit(PreferenceEdit::Agent(RESEARCH_AGENT.into())).await;

    h.sync.activate(Some("old")).await;
    assert!(!h.sync.current().deep_search);
    assert_eq!(h.sync.current().agent_name, DEFAULT_AGENT);
    assert_eq!(h.server.write_count(), 0);

    h.sync.activate(Some("fresh")).await;
    let fresh = h.server.record("fresh").unwrap();
    assert_eq!(fresh["deepSearch"], false);
    assert_eq!(fresh["agentName"], DEFAULT_AGENT);

    h.sync.activate(None).await;
    assert!(h.sync.current().deep_search);
    let (outcome, report) = h.sync.session_assigned("new").await.unwrap();
    assert_eq!(outcome.agent(), RESEARCH_AGENT);
    assert!(report.persisted);
    let new = h.server.record("new").unwrap();
    assert_eq!(new["deepSearch"], true);
    assert_eq!(new["agentName"], RESEARCH_AGENT);
    assert!(h.bindings.bound_agent("old").unwrap().is_none());
}

#[tokio::test]
async fn session_assigned_on_loaded_session_writes_bound_agent() {
    let mut h = harness();
    h.bindings.bind_agent("s1", CUSTOM_AGENT).unwrap();
    h.sync.edit(PreferenceEdit::Agent(RESEARCH_AGENT.into())).await;

    h.sync.activate(Some("s1")).await;
    assert_eq!(h.server.record("s1").unwrap()["agentName"], DEFAULT_AGENT);

    let (outcome, report) = h.sync.session_assigned("s1").await.unwrap();
    assert_eq!(
        outcome,
        BindingOutcome::KeptExisting {
            agent: CUSTOM_AGENT.into()
        }
    );
    assert!(report.persisted);
    assert_eq!(h.sync.current().agent_name, CUSTOM_AGENT);
    assert_eq!(h.server.record("s1").unwrap()["agentName"], CUSTOM_AGENT);
}

#[tokio::test]
async fn session_assigned_while_loading_merges_on_retry() {
    let mut h = harness();
    h.sync.edit(PreferenceEdit::DeepSearch(true)).await;
    h.server.set_fail_fetches(true);
    h.sync.activate(Some("s1")).await;

    h.server.set_fail_fetches(false);
    let (_, report) = h.sync.session_assigned("s1").await.unwrap();
    assert_eq!(
        report.hydration,
        Some(HydrationOutcome::Applied { server_had_record: false })
    );
    assert_eq!(h.server.record("s1").unwrap()["deepSearch"], true);
}

#[tokio::test]
async fn forget_clears_local_traces_when_server_delete_fails() {
    let mut h = harness();
    h.sync.session_assigned("s1").await.unwrap();

    h.server.set_fail_writes(true);
    assert!(h.sync.forget("s1").await.is_err());
    assert!(h.bindings.is_empty());
    assert!(h.cache.raw("prefsync:s1").is_none());
    assert_eq!(h.sync.controller().active_session(), None);
    assert!(h.server.record("s1").is_some());

    h.server.set_fail_writes(false);
    assert!(h.sync.forget("s1").await.unwrap());
    assert!(h.server.record("s1").is_none());
}
