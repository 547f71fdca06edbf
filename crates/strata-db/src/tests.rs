//! Tests for the data access layer
//!
//! Unit tests for the condition tree, value binder, descriptors, options,
//! and add-ons live here; end-to-end engine tests against the embedded
//! document backend live in `tests/engine_tests`.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::addon::AddOnRegistry;
use crate::backends::DocumentBackend;
use crate::descriptor::{Record, TableDescriptor};
use crate::engine::DataAccess;
use crate::value::ColumnType;


/// Model with a generated id, a soft-delete marker, and an add-on
/// governed id-list field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: Option<i64>,
    pub name: String,
    pub score: i64,
    pub deleted: bool,
    pub groups: Vec<i64>,
}

static PLAYER_DESC: Lazy<TableDescriptor> = Lazy::new(|| {
    TableDescriptor::builder("players")
        .id("id", ColumnType::BigInt)
        .column("name", ColumnType::Text)
        .column("score", ColumnType::BigInt)
        .delete_marker("deleted")
        .add_on("groups", "id-list")
        .build()
});

impl Record for Player {
    fn descriptor() -> &'static TableDescriptor {
        &PLAYER_DESC
    }
}

impl Player {
    pub fn named(name: &str, score: i64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            score,
            deleted: false,
            groups: Vec::new(),
        }
    }
}

/// Model without a soft-delete marker; partial JSON updates need the
/// serde defaults, like any model used with the raw-payload surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Note {
    pub id: Option<i64>,
    pub name: String,
    pub score: i64,
}

static NOTE_DESC: Lazy<TableDescriptor> = Lazy::new(|| {
    TableDescriptor::builder("notes")
        .id("id", ColumnType::BigInt)
        .column("name", ColumnType::Text)
        .column("score", ColumnType::BigInt)
        .build()
});

impl Record for Note {
    fn descriptor() -> &'static TableDescriptor {
        &NOTE_DESC
    }
}

/// Model with no id field at all
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub message: String,
}

static LOG_LINE_DESC: Lazy<TableDescriptor> =
    Lazy::new(|| TableDescriptor::builder("log_lines").column("message", ColumnType::Text).build());

impl Record for LogLine {
    fn descriptor() -> &'static TableDescriptor {
        &LOG_LINE_DESC
    }
}

/// Engine over a fresh embedded document backend
pub fn document_engine() -> DataAccess {
    let addons = Arc::new(AddOnRegistry::with_defaults().expect("default registry"));
    DataAccess::with_backend(Arc::new(DocumentBackend::new()), addons)
}

mod condition_tests {
    use crate::query::{CompareOp, ParamCursor, WhereNode};
    use crate::value::FieldValue;

    fn render(node: &WhereNode) -> (String, Vec<FieldValue>, usize) {
        let mut sql = String::new();
        let mut cursor = ParamCursor::new();
        node.generate(&mut sql, &mut cursor);
        let mut params = Vec::new();
        node.inject(&mut params);
        (sql, params, cursor.emitted())
    }

    #[test]
    fn single_leaf_binds_one_value() {
        let node = WhereNode::eq("name", "alice");
        let (sql, params, emitted) = render(&node);
        assert_eq!(sql, "name = $1");
        assert_eq!(emitted, 1);
        assert_eq!(params, vec![FieldValue::Text("alice".to_string())]);
    }

    #[test]
    fn flat_and_of_three_binds_in_order() {
        let node = WhereNode::And(vec![
            WhereNode::eq("a", 1i64),
            WhereNode::eq("b", 2i64),
            WhereNode::eq("c", 3i64),
        ]);
        let (sql, params, emitted) = render(&node);
        assert_eq!(sql, "(a = $1 AND b = $2 AND c = $3)");
        assert_eq!(emitted, 3);
        assert_eq!(
            params,
            vec![
                FieldValue::BigInt(1),
                FieldValue::BigInt(2),
                FieldValue::BigInt(3)
            ]
        );
    }

    #[test]
    fn nested_or_of_and_binds_in_tree_order() {
        let node = WhereNode::Or(vec![
            WhereNode::And(vec![
                WhereNode::eq("a", 1i64),
                WhereNode::condition("b", CompareOp::Gt, 2i64),
            ]),
            WhereNode::eq("c", 3i64),
        ]);
        let (sql, params, emitted) = render(&node);
        assert_eq!(sql, "((a = $1 AND b > $2) OR c = $3)");
        assert_eq!(emitted, 3);
        assert_eq!(
            params,
            vec![
                FieldValue::BigInt(1),
                FieldValue::BigInt(2),
                FieldValue::BigInt(3)
            ]
        );
    }

    #[test]
    fn empty_composite_renders_nothing() {
        let node = WhereNode::empty();
        let (sql, params, emitted) = render(&node);
        assert!(sql.is_empty());
        assert!(params.is_empty());
        assert_eq!(emitted, 0);
        assert!(node.is_empty());
    }

    #[test]
    fn empty_children_are_skipped_in_text_and_binding() {
        let node = WhereNode::And(vec![
            WhereNode::empty(),
            WhereNode::eq("a", 1i64),
            WhereNode::Or(Vec::new()),
        ]);
        let (sql, params, _) = render(&node);
        assert_eq!(sql, "(a = $1)");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn document_evaluation_follows_the_same_tree() {
        let doc = serde_json::json!({"name": "alice", "score": 7})
            .as_object()
            .cloned()
            .unwrap();
        let both = WhereNode::And(vec![
            WhereNode::eq("name", "alice"),
            WhereNode::condition("score", CompareOp::Ge, 5i64),
        ]);
        assert!(both.matches(&doc));
        let either = WhereNode::Or(vec![
            WhereNode::eq("name", "bob"),
            WhereNode::condition("score", CompareOp::Lt, 3i64),
        ]);
        assert!(!either.matches(&doc));
        assert!(WhereNode::empty().matches(&doc));
        assert!(WhereNode::condition("name", CompareOp::Like, "ali%").matches(&doc));
    }
}

mod value_tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use crate::error::DataError;
    use crate::value::{ColumnType, FieldValue};

    #[test]
    fn typed_conversions_round_trip_through_json() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 0).unwrap();
        let id = Uuid::new_v4();
        let cases = vec![
            (ColumnType::Boolean, FieldValue::Bool(true)),
            (ColumnType::BigInt, FieldValue::BigInt(42)),
            (ColumnType::Text, FieldValue::Text("hello".to_string())),
            (ColumnType::Uuid, FieldValue::Uuid(id)),
            (ColumnType::Timestamp, FieldValue::Timestamp(ts)),
            (ColumnType::Enumerated, FieldValue::Enum("ADMIN".to_string())),
            (ColumnType::Bytes, FieldValue::Bytes(vec![1, 2, 255])),
        ];
        for (ty, value) in cases {
            let json = value.to_json();
            let back = FieldValue::from_json(ty, &json).unwrap();
            assert_eq!(back, value, "round trip for {ty:?}");
        }
    }

    #[test]
    fn null_json_converts_to_null_for_every_type() {
        for ty in [ColumnType::Boolean, ColumnType::BigInt, ColumnType::Text] {
            assert_eq!(
                FieldValue::from_json(ty, &serde_json::Value::Null).unwrap(),
                FieldValue::Null
            );
        }
    }

    #[test]
    fn unconvertible_kinds_are_named_errors() {
        let err = FieldValue::from_json(ColumnType::Text, &json!(12)).unwrap_err();
        assert!(matches!(err, DataError::UnsupportedType(_)));
        let err = FieldValue::from_json(ColumnType::BigInt, &json!({"nested": true})).unwrap_err();
        assert!(matches!(err, DataError::UnsupportedType(_)));
        let err = FieldValue::from_json(ColumnType::Uuid, &json!("not-a-uuid")).unwrap_err();
        assert!(matches!(err, DataError::UnsupportedType(_)));
    }

    #[test]
    fn kind_reports_the_declared_column_type() {
        assert_eq!(FieldValue::BigInt(1).kind(), Some(ColumnType::BigInt));
        assert_eq!(
            FieldValue::Enum("X".to_string()).kind(),
            Some(ColumnType::Enumerated)
        );
        assert_eq!(FieldValue::Null.kind(), None);
    }
}

mod descriptor_tests {
    use super::{LogLine, Note, Player};
    use crate::descriptor::Record;

    #[test]
    fn descriptor_resolves_id_and_marker() {
        let desc = Player::descriptor();
        assert_eq!(desc.table(), "players");
        assert_eq!(desc.id_field().unwrap().column, "id");
        assert_eq!(desc.delete_marker().unwrap().column, "deleted");
        assert_eq!(desc.field("groups").unwrap().add_on, Some("id-list"));
        assert!(desc.field("missing").is_none());
    }

    #[test]
    fn markerless_and_idless_models_report_absence() {
        assert!(Note::descriptor().delete_marker().is_none());
        assert!(LogLine::descriptor().id_field().is_none());
    }
}

mod options_tests {
    use std::sync::Arc;

    use super::document_engine;
    use crate::error::DataError;
    use crate::query::{CheckFunction, QueryOptions, WhereNode};
    use crate::value::FieldValue;

    #[test]
    fn options_accumulate_additively() {
        let options = QueryOptions::new()
            .condition(WhereNode::eq("a", 1i64))
            .condition(WhereNode::eq("b", 2i64))
            .filter_column("a")
            .filter_columns(["b", "c"])
            .transmit_key(7i64)
            .limit(10)
            .limit(3);
        assert_eq!(options.conditions().len(), 2);
        assert_eq!(options.filter_columns, vec!["a", "b", "c"]);
        assert_eq!(options.transmit_keys(), &[FieldValue::BigInt(7)]);
        assert_eq!(options.effective_limit(), Some(3));
    }

    #[test]
    fn fusion_of_zero_conditions_honors_the_fail_fast_flag() {
        let engine = document_engine();
        let options = QueryOptions::new();
        let err = engine.condition_fusion_or_empty(&options, true).unwrap_err();
        assert!(matches!(err, DataError::QueryConstruction(_)));
        let empty = engine.condition_fusion_or_empty(&options, false).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn fusion_of_many_conditions_and_combines() {
        let engine = document_engine();
        let options = QueryOptions::new()
            .condition(WhereNode::eq("a", 1i64))
            .condition(WhereNode::eq("b", 2i64));
        let fused = engine.condition_fusion_or_empty(&options, true).unwrap();
        match fused {
            WhereNode::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected AND fusion, got {other:?}"),
        }
    }

    #[test]
    fn checks_run_against_the_outgoing_document() {
        let check: CheckFunction = Arc::new(|doc, _columns| {
            if doc.contains_key("name") {
                Ok(())
            } else {
                Err(DataError::Validation("name is required".to_string()))
            }
        });
        let options = QueryOptions::new().check(check);
        let with_name = serde_json::json!({"name": "x"}).as_object().cloned().unwrap();
        assert!(options.run_checks(&with_name, &[]).is_ok());
        let without = serde_json::json!({"other": 1}).as_object().cloned().unwrap();
        assert!(options.run_checks(&without, &[]).is_err());
    }
}

mod addon_tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::addon::{AddOnRegistry, FieldAddOn, IdListAddOn};
    use crate::error::DataError;
    use crate::value::FieldValue;

    #[test]
    fn id_list_joins_and_splits_with_nulls_filtered() {
        let addon = IdListAddOn::new();
        let encoded = addon.encode(&json!([1, serde_json::Value::Null, 2, 3])).unwrap();
        assert_eq!(encoded, FieldValue::Text("1-2-3".to_string()));
        let decoded = addon.decode(&FieldValue::Text("1-2-3".to_string())).unwrap();
        assert_eq!(decoded, json!([1, 2, 3]));
    }

    #[test]
    fn id_list_handles_empty_and_null_storage() {
        let addon = IdListAddOn::new();
        assert_eq!(
            addon.encode(&json!([])).unwrap(),
            FieldValue::Text(String::new())
        );
        assert_eq!(addon.decode(&FieldValue::Text(String::new())).unwrap(), json!([]));
        assert_eq!(addon.decode(&FieldValue::Null).unwrap(), json!([]));
    }

    #[test]
    fn id_list_rejects_non_list_values() {
        let addon = IdListAddOn::new();
        let err = addon.encode(&json!("1-2-3")).unwrap_err();
        assert!(matches!(err, DataError::Mapping(_)));
    }

    #[test]
    fn duplicate_registration_fails_at_startup() {
        let mut registry = AddOnRegistry::with_defaults().unwrap();
        let err = registry.register(Arc::new(IdListAddOn::new())).unwrap_err();
        assert!(matches!(err, DataError::Mapping(_)));
    }

    #[test]
    fn excluded_fields_stay_out_of_default_mapping() {
        let addon = IdListAddOn::new();
        assert!(!addon.include_in_insert());
        assert!(!addon.include_in_read());
    }
}

mod schema_tests {
    use super::Player;
    use crate::addon::AddOnRegistry;
    use crate::descriptor::Record;
    use crate::schema;

    #[test]
    fn create_table_follows_the_descriptor() {
        let registry = AddOnRegistry::with_defaults().unwrap();
        let sql = schema::create_table_sql(Player::descriptor(), &registry, false).unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS players"));
        assert!(sql.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(sql.contains("name TEXT NOT NULL"));
        assert!(sql.contains("deleted BOOLEAN NOT NULL DEFAULT FALSE"));
        assert!(sql.contains("groups TEXT"));
        assert!(!sql.contains("DROP TABLE"));
    }

    #[test]
    fn create_drop_prepends_the_drop_statement() {
        let registry = AddOnRegistry::with_defaults().unwrap();
        let sql = schema::create_table_sql(Player::descriptor(), &registry, true).unwrap();
        assert!(sql.starts_with("DROP TABLE IF EXISTS players"));
    }
}

mod config_tests {
    use crate::config::{BackendKind, DataConfig};
    use crate::error::DataError;

    #[test]
    fn known_schemes_resolve() {
        assert_eq!(
            DataConfig::new("postgres://localhost/app").backend_kind().unwrap(),
            BackendKind::Postgres
        );
        assert_eq!(
            DataConfig::new("postgresql://localhost/app").backend_kind().unwrap(),
            BackendKind::Postgres
        );
        assert_eq!(
            DataConfig::new("document://local").backend_kind().unwrap(),
            BackendKind::Document
        );
    }

    #[test]
    fn unknown_selection_fails_construction() {
        let err = DataConfig::new("carrier-pigeon://coop").backend_kind().unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }
}
