// Field projection for API responses.
// Narrows objects and repository lists to the fields named in the query string.

use serde::Deserialize;
use serde_json::{Map, Value};

/// `?fields=` on single-object endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct FieldsQuery {
    pub fields: Option<String>,
}

/// Query accepted by repository list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoListQuery {
    pub fields: Option<String>,
    pub repo_fields: Option<String>,
    pub language_fields: Option<String>,
    pub fresh: Option<String>,
}

impl RepoListQuery {
    /// `fresh=true` bypasses the cache.
    pub fn fresh(&self) -> bool {
        self.fresh.as_deref() == Some("true")
    }
}

/// Split a comma-separated field list, ignoring blanks.
pub fn field_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect()
}

/// Keep only the listed members of an object. Non-objects pass through.
pub fn select_fields(value: &Value, fields: &[&str]) -> Value {
    match value {
        Value::Object(members) => {
            let selected: Map<String, Value> = fields
                .iter()
                .filter_map(|f| members.get(*f).map(|v| (f.to_string(), v.clone())))
                .collect();
            Value::Object(selected)
        }
        other => other.clone(),
    }
}

/// Apply `?fields=` to a single object.
pub fn project_object(value: &Value, fields: Option<&str>) -> Value {
    match fields {
        Some(fields) => select_fields(value, &field_list(fields)),
        None => value.clone(),
    }
}

/// Repositories the front-end lists: those tagged with at least one topic.
fn has_topics(repo: &Value) -> bool {
    repo.get("topics")
        .and_then(Value::as_array)
        .is_some_and(|topics| !topics.is_empty())
}

/// Filter a repository list to tagged repositories and apply the projection.
///
/// `repoFields` takes precedence over `fields`; when it includes `languages`,
/// `languageFields` narrows the language map.
pub fn project_repos(repos: &Value, query: &RepoListQuery) -> Value {
    let tagged = repos
        .as_array()
        .map(|items| items.iter().filter(|r| has_topics(r)));
    let Some(tagged) = tagged else {
        return repos.clone();
    };

    let projected: Vec<Value> = if let Some(repo_fields) = query.repo_fields.as_deref() {
        let fields = field_list(repo_fields);
        let languages = query.language_fields.as_deref().map(field_list);
        tagged
            .map(|repo| {
                let mut selected = select_fields(repo, &fields);
                if let (Some(languages), Some(current)) =
                    (&languages, selected.get_mut("languages"))
                {
                    *current = select_fields(current, languages);
                }
                selected
            })
            .collect()
    } else if let Some(fields) = query.fields.as_deref() {
        let fields = field_list(fields);
        tagged.map(|repo| select_fields(repo, &fields)).collect()
    } else {
        tagged.cloned().collect()
    };

    Value::Array(projected)
}
