//! OpenSearch index settings and mappings.

use serde_json::{json, Value};

/// Get the settings and mappings for the shared entity index.
///
/// Entity fields live under the dynamic `fields` object; string fields are
/// mapped as `text` with a `raw` keyword sub-field.
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "dynamic_templates": [
                {
                    "field_strings": {
                        "path_match": "fields.*",
                        "match_mapping_type": "string",
                        "mapping": {
                            "type": "text",
                            "fields": {
                                "raw": { "type": "keyword", "ignore_above": 256 }
                            }
                        }
                    }
                }
            ],
            "properties": {
                "entity_type": { "type": "keyword" },
                "entity_id": { "type": "keyword" },
                "id_parts": { "type": "keyword", "index": false },
                "fields": { "type": "object", "dynamic": true },
                "indexed_at": { "type": "date" }
            }
        }
    })
}
