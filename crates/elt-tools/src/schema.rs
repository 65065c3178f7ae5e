//! Schema registry for the raw dataset.
//!
//! Field order in a [`TableSchema`] is the column order of every load into
//! that table. The warehouse binds CSV values by position once the header
//! row is skipped, so reordering a schema here reorders the loaded data.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PipelineError;

/// Warehouse column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Timestamp,
    Boolean,
    Float,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "STRING"),
            FieldType::Timestamp => write!(f, "TIMESTAMP"),
            FieldType::Boolean => write!(f, "BOOLEAN"),
            FieldType::Float => write!(f, "FLOAT"),
        }
    }
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, field_type: FieldType, required: bool) -> Self {
        Self {
            name,
            field_type,
            required,
        }
    }

    /// Warehouse mode string.
    pub fn mode(&self) -> &'static str {
        if self.required {
            "REQUIRED"
        } else {
            "NULLABLE"
        }
    }
}

/// Table category. Partitioned tables get date handling at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Time-partitioned operational table.
    Partitioned,
    /// Static reference table.
    Reference,
}

/// Ordered schema of one warehouse table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub kind: TableKind,
    pub fields: Vec<FieldSpec>,
}

impl TableSchema {
    /// Field names in load order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Find a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Static mapping from table name to schema.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: HashMap<&'static str, TableSchema>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Register a table schema, replacing any previous one of the same name.
    pub fn register(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name, schema);
    }

    /// Look up a table schema by name.
    pub fn lookup(&self, table: &str) -> Result<&TableSchema, PipelineError> {
        self.tables
            .get(table)
            .ok_or_else(|| PipelineError::UnknownTable(table.to_string()))
    }

    /// List registered table names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Registry with every table of the raw dataset.
    pub fn builtin() -> Self {
        use FieldType::{Boolean, Float, String as Str, Timestamp};

        let partitioned = |name, fields| TableSchema {
            name,
            kind: TableKind::Partitioned,
            fields,
        };
        let reference = |name, fields| TableSchema {
            name,
            kind: TableKind::Reference,
            fields,
        };
        let nullable = |name| FieldSpec::new(name, Str, false);
        let id = FieldSpec::new("_id", Str, true);

        let mut registry = Self::new();

        registry.register(partitioned(
            "users",
            vec![id.clone(), FieldSpec::new("createdAt", Timestamp, false)],
        ));
        registry.register(partitioned(
            "orders",
            vec![
                nullable("_deliveryAddress"),
                id.clone(),
                nullable("_invoiceAddress"),
                nullable("_user"),
                FieldSpec::new("createdAt", Timestamp, false),
                nullable("oneTimePurchase"),
                nullable("price"),
                nullable("status"),
                nullable("subscriptions"),
            ],
        ));
        registry.register(partitioned(
            "subscriptions",
            vec![
                id.clone(),
                nullable("_user"),
                FieldSpec::new("isActive", Boolean, false),
                FieldSpec::new("isSkip", Boolean, false),
                nullable("products"),
                FieldSpec::new("totalQuantity", Float, false),
                FieldSpec::new("createdAt", Timestamp, false),
                FieldSpec::new("nextOrderDate", Timestamp, false),
                FieldSpec::new("startDate", Timestamp, false),
            ],
        ));
        registry.register(partitioned(
            "shipments",
            vec![
                id.clone(),
                nullable("_order"),
                nullable("_user"),
                nullable("details"),
                nullable("label"),
                FieldSpec::new("collectDate", Timestamp, false),
            ],
        ));

        registry.register(reference(
            "marketing_spend",
            vec![
                nullable("channel"),
                nullable("2025-09-20"),
                nullable("2025-09-21"),
                nullable("2025-09-22"),
                nullable("2025-09-23"),
                nullable("2025-09-24"),
                nullable("2025-09-25"),
                nullable("2025-09-26"),
                nullable("2025-09-27"),
            ],
        ));
        registry.register(reference(
            "addresses",
            vec![
                nullable("_city"),
                nullable("_country"),
                id.clone(),
                nullable("_neighborhood"),
                nullable("_state"),
                nullable("_user"),
                nullable("invoiceType"),
            ],
        ));
        registry.register(reference("countries", vec![id.clone(), nullable("name")]));
        registry.register(reference(
            "states",
            vec![nullable("_country"), id.clone(), nullable("name")],
        ));
        registry.register(reference(
            "cities",
            vec![
                nullable("_country"),
                id.clone(),
                nullable("_state"),
                nullable("name"),
            ],
        ));
        registry.register(reference(
            "neighborhoods",
            vec![
                nullable("_city"),
                nullable("_country"),
                id,
                nullable("name"),
                nullable("postalCode"),
            ],
        ));

        registry
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
