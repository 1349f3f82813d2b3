use crate::error::{Result, TriageError};
use crate::search::{SearchBackend, SearchRequest, SearchResponse};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tantivy::{
    collector::{Count, TopDocs},
    query::{AllQuery, Query, QueryParser},
    schema::{Field, Schema, Value, STORED, STRING},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument,
};

const SOURCE_FIELD: &str = "__source";

// ---------------------------------------------------------------------------
// LocalIndex
// ---------------------------------------------------------------------------

/// An ephemeral in-RAM search backend over JSON documents.
///
/// Every declared field is indexed as an exact-match term, so queries look
/// like `status:open AND label:phishing`. Bare terms search all declared
/// fields. The original document is stored verbatim and returned as the
/// response item. Useful for offline previews and for exercising the
/// validation engine without a server.
pub struct LocalIndex {
    index: Index,
    reader: IndexReader,
    fields: Vec<(String, Field)>,
    source: Field,
}

impl LocalIndex {
    /// Build an index over `docs`, indexing the listed `fields`.
    ///
    /// A field name may be a dotted path into nested objects. Arrays index
    /// each element; numbers and booleans index their JSON text.
    pub fn build<S: AsRef<str>>(fields: &[S], docs: &[serde_json::Value]) -> Result<Self> {
        let names: BTreeSet<&str> = fields.iter().map(AsRef::as_ref).collect();

        let mut builder = Schema::builder();
        let mut declared = Vec::with_capacity(names.len());
        for name in names {
            if name.is_empty() || name.starts_with('-') || name == SOURCE_FIELD {
                return Err(TriageError::Search(format!("invalid index field name '{name}'")));
            }
            declared.push((name.to_string(), builder.add_text_field(name, STRING)));
        }
        let source = builder.add_text_field(SOURCE_FIELD, STORED);
        let index = Index::create_in_ram(builder.build());

        let mut writer: IndexWriter = index
            .writer(15_000_000)
            .map_err(|e| TriageError::Search(e.to_string()))?;

        for json in docs {
            let mut doc = TantivyDocument::default();
            for (name, field) in &declared {
                for term in terms_at(json, name) {
                    doc.add_text(*field, term);
                }
            }
            doc.add_text(source, json.to_string());
            writer
                .add_document(doc)
                .map_err(|e| TriageError::Search(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| TriageError::Search(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| TriageError::Search(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            fields: declared,
            source,
        })
    }

    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn parse(&self, query_str: &str) -> Result<Box<dyn Query>> {
        let trimmed = query_str.trim();
        if trimmed.is_empty() || trimmed == "*" || trimmed == "*:*" {
            return Ok(Box::new(AllQuery));
        }
        let defaults = self.fields.iter().map(|(_, f)| *f).collect();
        let mut parser = QueryParser::for_index(&self.index, defaults);
        parser.set_conjunction_by_default();
        parser
            .parse_query(trimmed)
            .map_err(|e| TriageError::Search(format!("invalid query '{trimmed}': {e}")))
    }

    /// Run `request` synchronously.
    pub fn query(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let query = self.parse(&request.query)?;
        let searcher = self.reader.searcher();
        let offset = request.offset.unwrap_or(0);

        // TopDocs rejects a zero limit; count-only requests skip it.
        if request.rows == 0 {
            let total = searcher
                .search(&query, &Count)
                .map_err(|e| TriageError::Search(e.to_string()))?;
            return Ok(SearchResponse {
                total: total as u64,
                items: Vec::new(),
                offset,
                rows: 0,
            });
        }

        let collector = (Count, TopDocs::with_limit(request.rows).and_offset(offset));
        let (total, top_docs) = searcher
            .search(&query, &collector)
            .map_err(|e| TriageError::Search(e.to_string()))?;

        let wanted = request.fl.as_deref().map(field_list);
        let mut items = Vec::with_capacity(top_docs.len());
        for (_score, addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| TriageError::Search(e.to_string()))?;
            let raw = doc
                .get_first(self.source)
                .and_then(|v| v.as_str())
                .unwrap_or("null");
            let item: serde_json::Value = serde_json::from_str(raw)?;
            items.push(match &wanted {
                Some(keys) => project(item, keys),
                None => item,
            });
        }

        Ok(SearchResponse {
            total: total as u64,
            rows: items.len(),
            items,
            offset,
        })
    }
}

#[async_trait]
impl SearchBackend for LocalIndex {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.query(request)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn lookup<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if let Some(v) = json.get(path) {
        return Some(v);
    }
    path.split('.').try_fold(json, |node, key| node.get(key))
}

fn terms_at(json: &serde_json::Value, path: &str) -> Vec<String> {
    fn scalar(v: &serde_json::Value) -> Option<String> {
        match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
    match lookup(json, path) {
        Some(serde_json::Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(v) => scalar(v).into_iter().collect(),
        None => Vec::new(),
    }
}

fn field_list(fl: &str) -> Vec<String> {
    fl.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn project(item: serde_json::Value, keys: &[String]) -> serde_json::Value {
    match item {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(k, _)| keys.iter().any(|w| w == k))
                .collect(),
        ),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alerts() -> LocalIndex {
        let docs = vec![
            json!({ "id": "1", "status": "open", "labels": ["phishing"], "score": 10 }),
            json!({ "id": "2", "status": "open", "labels": ["malware", "phishing"], "score": 50 }),
            json!({ "id": "3", "status": "closed", "labels": [], "score": 10 }),
            json!({ "id": "4", "status": "open", "assignment": { "user": "alice" } }),
        ];
        LocalIndex::build(&["id", "status", "labels", "score", "assignment.user"], &docs).unwrap()
    }

    fn total(index: &LocalIndex, q: &str) -> u64 {
        index.query(&SearchRequest::count_only(q)).unwrap().total
    }

    #[test]
    fn counts_field_scoped_queries() {
        let index = alerts();
        assert_eq!(index.len(), 4);
        assert_eq!(total(&index, "status:open"), 3);
        assert_eq!(total(&index, "status:closed"), 1);
        assert_eq!(total(&index, "labels:phishing"), 2);
        assert_eq!(total(&index, "(status:open) AND (labels:malware)"), 1);
        assert_eq!(total(&index, "labels:phishing OR status:closed"), 3);
        assert_eq!(total(&index, "score:10"), 2);
        assert_eq!(total(&index, "assignment.user:alice"), 1);
    }

    #[test]
    fn empty_and_star_match_everything() {
        let index = alerts();
        assert_eq!(total(&index, ""), 4);
        assert_eq!(total(&index, "*"), 4);
    }

    #[test]
    fn count_only_returns_no_items() {
        let response = alerts().query(&SearchRequest::count_only("status:open")).unwrap();
        assert_eq!(response.total, 3);
        assert!(response.items.is_empty());
    }

    #[test]
    fn rows_and_offset_page_through_results() {
        let index = alerts();
        let first = index.query(&SearchRequest::new("status:open", 2)).unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.items.len(), 2);

        let rest = index
            .query(&SearchRequest::new("status:open", 2).offset(2))
            .unwrap();
        assert_eq!(rest.total, 3);
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.offset, 2);
    }

    #[test]
    fn field_list_projects_items() {
        let response = alerts()
            .query(&SearchRequest::new("status:closed", 5).fields("id, status"))
            .unwrap();
        assert_eq!(response.items, vec![json!({ "id": "3", "status": "closed" })]);
    }

    #[test]
    fn malformed_query_is_an_error() {
        let err = alerts().query(&SearchRequest::count_only("status:(open")).unwrap_err();
        assert!(matches!(err, TriageError::Search(_)));
    }

    #[test]
    fn reserved_field_name_is_rejected() {
        assert!(LocalIndex::build(&[SOURCE_FIELD], &[]).is_err());
    }
}
