//! OpenSearch query builders.
//!
//! Every entity type shares one index, so each query is scoped to a single
//! type with a `term` filter on `entity_type`.

use serde_json::{json, Value};

use search_sync_shared::{EntityDocument, EntityId, IdValue, QueryFilter, SearchQuery};

/// Upper bound on hits returned when a query has no limit.
/// Matches the default `index.max_result_window`.
pub const MAX_RESULT_WINDOW: usize = 10_000;

/// Build the `bool` clause selecting the documents a query matches.
pub fn build_filter(query: &SearchQuery) -> Value {
    let type_filter = json!({ "term": { "entity_type": query.entity_type } });

    let must = match &query.filter {
        QueryFilter::All => json!({ "match_all": {} }),
        QueryFilter::Term { field, value } if field == "id" => {
            json!({ "term": { "entity_id": value } })
        }
        QueryFilter::Term { field, value } => {
            json!({ "match": { format!("fields.{}", field): { "query": value, "operator": "and" } } })
        }
        QueryFilter::Text { query } => json!({
            "simple_query_string": {
                "query": query,
                "fields": ["fields.*"],
                "default_operator": "and",
                "analyze_wildcard": true
            }
        }),
    };

    json!({
        "bool": {
            "filter": [type_filter],
            "must": [must]
        }
    })
}

/// Build a search request body.
pub fn build_search_query(query: &SearchQuery) -> Value {
    json!({
        "query": build_filter(query),
        "size": query.limit.unwrap_or(MAX_RESULT_WINDOW).min(MAX_RESULT_WINDOW),
        "track_total_hits": true,
        "sort": [{ "entity_id": "asc" }]
    })
}

/// Build a delete-by-query request body. Limits are ignored.
pub fn build_delete_query(query: &SearchQuery) -> Value {
    json!({ "query": build_filter(query) })
}

/// Serialize a document into the indexed `_source` shape.
pub fn document_source(doc: &EntityDocument) -> Value {
    json!({
        "entity_type": doc.entity_type,
        "entity_id": doc.id.to_string(),
        "id_parts": doc.id.parts().iter().map(IdValue::to_json).collect::<Vec<_>>(),
        "fields": doc.fields,
        "indexed_at": doc.indexed_at,
    })
}

/// Convert a search hit back into a document.
///
/// Returns `None` if the hit lacks the fields written by [`document_source`].
pub fn parse_hit(hit: &Value) -> Option<EntityDocument> {
    let source = hit.get("_source")?;
    let entity_type = source.get("entity_type")?.as_str()?;
    let parts: Vec<IdValue> = serde_json::from_value(source.get("id_parts")?.clone()).ok()?;
    let id = EntityId::composite(parts)?;

    let mut doc = EntityDocument::new(entity_type, id);
    if let Some(fields) = source.get("fields").and_then(Value::as_object) {
        doc.fields = fields.clone();
    }
    if let Some(indexed_at) = source
        .get("indexed_at")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
    {
        doc.indexed_at = indexed_at;
    }
    Some(doc)
}

/// Read `hits.total.value` from a search response.
pub fn total_hits(response: &Value) -> usize {
    response
        .get("hits")
        .and_then(|h| h.get("total"))
        .and_then(|t| t.get("value"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_on_id_targets_entity_id() {
        let body = build_search_query(&SearchQuery::term("Place", "id", "1"));
        let bool_query = &body["query"]["bool"];

        assert_eq!(bool_query["filter"][0]["term"]["entity_type"], "Place");
        assert_eq!(bool_query["must"][0]["term"]["entity_id"], "1");
        assert_eq!(body["track_total_hits"], true);
    }

    #[test]
    fn test_field_term_and_text_queries() {
        let term = build_filter(&SearchQuery::term("Place", "name", "Valinor"));
        assert_eq!(
            term["bool"]["must"][0]["match"]["fields.name"]["query"],
            "Valinor"
        );

        let text = build_filter(&SearchQuery::text("Place", "helm"));
        assert_eq!(
            text["bool"]["must"][0]["simple_query_string"]["query"],
            "helm"
        );
    }

    #[test]
    fn test_limit_is_capped() {
        let unlimited = build_search_query(&SearchQuery::all("Place"));
        assert_eq!(unlimited["size"], MAX_RESULT_WINDOW);

        let limited = build_search_query(&SearchQuery::all("Place").with_limit(3));
        assert_eq!(limited["size"], 3);

        let delete = build_delete_query(&SearchQuery::all("Place").with_limit(3));
        assert!(delete.get("size").is_none());
    }

    #[test]
    fn test_parse_hit() {
        let doc = EntityDocument::new(
            "PlaceSorcerer",
            EntityId::composite(vec![IdValue::Integer(1), IdValue::Text("gandalf".into())])
                .unwrap(),
        )
        .with_field("role", "keeper");
        let hit = json!({ "_source": document_source(&doc), "_score": 1.0 });

        let parsed = parse_hit(&hit).unwrap();

        assert_eq!(parsed.entity_type, "PlaceSorcerer");
        assert_eq!(parsed.id.to_string(), "1:gandalf");
        assert_eq!(parsed.field("role"), Some(&Value::from("keeper")));
        assert_eq!(parsed.indexed_at, doc.indexed_at);
    }

    #[test]
    fn test_parse_hit_invalid() {
        let hit = json!({ "_source": { "entity_type": "Place" }, "_score": 1.0 });
        assert!(parse_hit(&hit).is_none());
    }

    #[test]
    fn test_total_hits() {
        let response = json!({ "hits": { "total": { "value": 42, "relation": "eq" }, "hits": [] } });
        assert_eq!(total_hits(&response), 42);
        assert_eq!(total_hits(&json!({})), 0);
    }
}
