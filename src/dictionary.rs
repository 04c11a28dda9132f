//! Machine-readable data dictionary for the published tables
//!
//! Generated from the same [`TableDef`](crate::store::TableDef)s the store
//! uses to create its schema, so there is no separately maintained document
//! to drift out of date.

use crate::store::schema;
use serde_json::json;

/// Configuration parameters that shape published metrics; surfaced here so
/// consumers can see what the numbers depend on
struct ParamDoc {
    name: &'static str,
    required: bool,
    definition: &'static str,
}

const PARAMS: &[ParamDoc] = &[
    ParamDoc {
        name: "ORPHAN_GRACE_HOURS",
        required: true,
        definition: "Hours a payment or order may wait for its cross-source counterpart before it is ledgered as an orphan",
    },
    ParamDoc {
        name: "FUZZY_MATCH_THRESHOLD",
        required: true,
        definition: "Minimum fuzzy-match score (0.0-1.0) for attaching a B2B source key to an existing entity; below it the candidate is flagged for manual review",
    },
    ParamDoc {
        name: "DUPLICATE_WINDOW_HOURS",
        required: false,
        definition: "Window within which two sources reporting the same entity and amount collapse to one canonical event (default 24)",
    },
    ParamDoc {
        name: "CONFLICT_EPSILON",
        required: false,
        definition: "Relative amount difference separating duplicate collapse from an unresolved conflict (default 0.01)",
    },
    ParamDoc {
        name: "ACTIVATION_WINDOW_DAYS",
        required: false,
        definition: "Days after acquisition in which an engagement event counts as activation (default 30)",
    },
    ParamDoc {
        name: "FUNNEL_MATURITY_DAYS",
        required: false,
        definition: "Minimum entity age before it enters conversion-rate denominators (default 30)",
    },
    ParamDoc {
        name: "COGS_RATES_PATH",
        required: false,
        definition: "JSON file mapping product_id to COGS rate as a fraction of gross; products without a rate raise UNRATED_PRODUCT",
    },
];

/// Build the dictionary as a JSON value
pub fn data_dictionary() -> serde_json::Value {
    let tables: Vec<serde_json::Value> = schema::ALL_TABLES
        .iter()
        .map(|table| {
            json!({
                "table": table.name,
                "fields": table
                    .fields
                    .iter()
                    .map(|f| {
                        json!({
                            "name": f.name,
                            "type": f.sql_type,
                            "definition": f.definition,
                            "formula": f.formula,
                        })
                    })
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "tables": tables,
        "parameters": PARAMS
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "required": p.required,
                    "definition": p.definition,
                })
            })
            .collect::<Vec<_>>(),
    })
}

/// Pretty-printed dictionary for the `data_dictionary` binary
pub fn render_json() -> String {
    serde_json::to_string_pretty(&data_dictionary()).expect("dictionary is always serializable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_covers_every_table_and_field() {
        let dict = data_dictionary();
        let tables = dict["tables"].as_array().unwrap();
        assert_eq!(tables.len(), schema::ALL_TABLES.len());

        for (table_def, table_json) in schema::ALL_TABLES.iter().zip(tables) {
            assert_eq!(table_json["table"], table_def.name);
            assert_eq!(
                table_json["fields"].as_array().unwrap().len(),
                table_def.fields.len()
            );
        }
    }

    #[test]
    fn test_required_parameters_are_documented() {
        let dict = data_dictionary();
        let params = dict["parameters"].as_array().unwrap();

        for name in ["ORPHAN_GRACE_HOURS", "FUZZY_MATCH_THRESHOLD"] {
            let param = params.iter().find(|p| p["name"] == name).unwrap();
            assert_eq!(param["required"], true);
        }
    }

    #[test]
    fn test_every_field_has_a_formula() {
        let dict = data_dictionary();
        for table in dict["tables"].as_array().unwrap() {
            for field in table["fields"].as_array().unwrap() {
                assert!(!field["formula"].as_str().unwrap().is_empty());
            }
        }
    }
}
