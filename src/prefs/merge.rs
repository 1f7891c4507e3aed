//! Precedence merge and record normalization.
//!
//! [`normalize_record`] turns whatever JSON a store hands back into a
//! [`PartialPreferences`], mapping legacy encodings of the retrieval scope onto
//! [`RagScope`] and dropping anything it does not recognize.
//! [`merge_preferences`] resolves one [`PreferenceSet`] from the layered sources:
//! server record, then draft, then built-in defaults. The local cache is not a
//! layer; it only seeds live state until the server answers.

use serde_json::{Map, Value};

use crate::prefs::types::{dedup_ids, PartialPreferences, PreferenceSet, RagScope, SearchPolicy};

/// Keys the retrieval scope may arrive under, newest first.
const RAG_SCOPE_KEYS: &[&str] = &["searchRagScope", "search_rag_scope", "ragScope", "rag_scope"];

/// Boolean flag older clients used instead of a scope value.
const SKIP_RAG_KEYS: &[&str] = &["skip_rag_search", "skipRagSearch"];

/// The layered inputs to a merge. Any layer may be missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeSources<'a> {
    pub server: Option<&'a PartialPreferences>,
    pub draft: Option<&'a PartialPreferences>,
}

/// Resolve one value field by field: server → draft → default.
pub fn merge_preferences(sources: &MergeSources<'_>, defaults: &PreferenceSet) -> PreferenceSet {
    let mut merged = defaults.clone();
    // Lowest precedence first; each layer overwrites only the fields it has.
    for layer in [sources.draft, sources.server].into_iter().flatten() {
        merged.apply(layer);
    }
    merged
}

/// Normalize a raw store record. Never fails: unknown shapes become "no opinion".
pub fn normalize_record(record: &Value) -> PartialPreferences {
    let Some(obj) = record.as_object() else {
        if !record.is_null() {
            tracing::debug!(kind = json_kind(record), "ignoring non-object preference record");
        }
        return PartialPreferences::default();
    };

    PartialPreferences {
        document_library_ids: id_list(obj, &["documentLibraryIds", "document_library_ids"]),
        prompt_resource_ids: id_list(obj, &["promptResourceIds", "prompt_resource_ids"]),
        template_resource_ids: id_list(obj, &["templateResourceIds", "template_resource_ids"]),
        search_policy: first_str(obj, &["searchPolicy", "search_policy"])
            .and_then(SearchPolicy::parse_lenient),
        search_rag_scope: rag_scope(obj),
        deep_search: first_present(obj, &["deepSearch", "deep_search"]).and_then(Value::as_bool),
        agent_name: first_str(obj, &["agentName", "agent_name"])
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string),
    }
}

/// `true` if the record carries a retrieval scope in anything but the current encoding.
pub fn has_legacy_fields(record: &Value) -> bool {
    let Some(obj) = record.as_object() else {
        return false;
    };
    RAG_SCOPE_KEYS[1..]
        .iter()
        .chain(SKIP_RAG_KEYS)
        .any(|key| obj.contains_key(*key))
        || obj
            .get("searchRagScope")
            .and_then(Value::as_str)
            .is_some_and(|raw| raw.parse::<RagScope>().is_err())
}

fn rag_scope(obj: &Map<String, Value>) -> Option<RagScope> {
    let scoped = RAG_SCOPE_KEYS
        .iter()
        .filter_map(|key| obj.get(*key))
        .filter_map(Value::as_str)
        .find_map(|raw| {
            let parsed = RagScope::parse_lenient(raw);
            if parsed.is_none() {
                tracing::debug!(value = raw, "unrecognized retrieval scope");
            }
            parsed
        });
    if scoped.is_some() {
        return scoped;
    }

    // skip_rag_search=false says nothing about which scope to use.
    let skip = first_present(obj, SKIP_RAG_KEYS).and_then(Value::as_bool)?;
    skip.then_some(RagScope::GeneralOnly)
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    first_present(obj, keys).and_then(Value::as_str)
}

fn id_list(obj: &Map<String, Value>, keys: &[&str]) -> Option<Vec<String>> {
    let items = first_present(obj, keys)?.as_array()?;
    Some(dedup_ids(items.iter().filter_map(Value::as_str)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::types::DEFAULT_AGENT;
    use serde_json::json;

    fn defaults() -> PreferenceSet {
        PreferenceSet {
            document_library_ids: vec!["default-lib".into()],
            ..Default::default()
        }
    }

    #[test]
    fn server_beats_draft_beats_default() {
        let server = PartialPreferences {
            search_policy: Some(SearchPolicy::Strict),
            ..Default::default()
        };
        let draft = PartialPreferences {
            search_policy: Some(SearchPolicy::Semantic),
            deep_search: Some(true),
            ..Default::default()
        };
        let merged = merge_preferences(
            &MergeSources {
                server: Some(&server),
                draft: Some(&draft),
            },
            &defaults(),
        );
        assert_eq!(merged.search_policy, SearchPolicy::Strict);
        assert!(merged.deep_search);
        assert_eq!(merged.document_library_ids, vec!["default-lib"]);
        assert_eq!(merged.agent_name, DEFAULT_AGENT);
    }

    #[test]
    fn field_missing_from_server_and_draft_is_the_default() {
        let server = PartialPreferences {
            search_policy: Some(SearchPolicy::Strict),
            ..Default::default()
        };
        let draft = PartialPreferences {
            search_rag_scope: Some(RagScope::CorpusOnly),
            ..Default::default()
        };
        let merged = merge_preferences(
            &MergeSources {
                server: Some(&server),
                draft: Some(&draft),
            },
            &defaults(),
        );
        assert_eq!(merged.search_policy, SearchPolicy::Strict);
        assert_eq!(merged.search_rag_scope, RagScope::CorpusOnly);
        assert!(!merged.deep_search);
        assert_eq!(merged.document_library_ids, vec!["default-lib"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let server = normalize_record(&json!({ "deepSearch": true, "ragScope": "general" }));
        let sources = MergeSources {
            server: Some(&server),
            draft: None,
        };
        assert_eq!(
            merge_preferences(&sources, &defaults()),
            merge_preferences(&sources, &defaults())
        );
    }

    #[test]
    fn no_sources_yields_defaults() {
        let merged = merge_preferences(&MergeSources::default(), &defaults());
        assert_eq!(merged, defaults());
    }

    #[test]
    fn skip_rag_search_true_means_general_only() {
        let record = normalize_record(&json!({ "skip_rag_search": true }));
        assert_eq!(record.search_rag_scope, Some(RagScope::GeneralOnly));
    }

    #[test]
    fn skip_rag_search_false_is_no_opinion() {
        let record = normalize_record(&json!({ "skip_rag_search": false }));
        assert_eq!(record.search_rag_scope, None);
        assert!(record.is_empty());
    }

    #[test]
    fn current_scope_wins_over_skip_flag() {
        let record = normalize_record(&json!({
            "searchRagScope": "corpus_only",
            "skip_rag_search": true,
        }));
        assert_eq!(record.search_rag_scope, Some(RagScope::CorpusOnly));
    }

    #[test]
    fn older_scope_key_is_recognized() {
        let record = normalize_record(&json!({ "ragScope": "general" }));
        assert_eq!(record.search_rag_scope, Some(RagScope::GeneralOnly));
    }

    #[test]
    fn unrecognized_scope_falls_through_to_legacy_flag() {
        let record = normalize_record(&json!({
            "searchRagScope": "everything",
            "skip_rag_search": true,
        }));
        assert_eq!(record.search_rag_scope, Some(RagScope::GeneralOnly));
    }

    #[test]
    fn unrecognized_values_are_absent() {
        let record = normalize_record(&json!({
            "searchRagScope": "everything",
            "searchPolicy": 7,
            "deepSearch": "yes",
            "documentLibraryIds": "lib-1",
            "agentName": "",
        }));
        assert!(record.is_empty());
    }

    #[test]
    fn non_object_records_are_empty() {
        assert!(normalize_record(&json!(null)).is_empty());
        assert!(normalize_record(&json!([1, 2, 3])).is_empty());
        assert!(normalize_record(&json!("hybrid")).is_empty());
    }

    #[test]
    fn id_lists_skip_non_strings_and_duplicates() {
        let record = normalize_record(&json!({
            "documentLibraryIds": ["a", 1, "b", "a", null],
            "prompt_resource_ids": [],
        }));
        assert_eq!(record.document_library_ids, Some(vec!["a".into(), "b".into()]));
        assert_eq!(record.prompt_resource_ids, Some(Vec::new()));
    }

    #[test]
    fn legacy_detection() {
        assert!(has_legacy_fields(&json!({ "skip_rag_search": true })));
        assert!(has_legacy_fields(&json!({ "ragScope": "hybrid" })));
        assert!(has_legacy_fields(&json!({ "searchRagScope": "corpus" })));
        assert!(!has_legacy_fields(&json!({ "searchRagScope": "hybrid" })));
        assert!(!has_legacy_fields(&json!(null)));
    }
}
