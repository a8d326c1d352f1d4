//! Schema designer state and structured fake-row generation.
//!
//! Every mutation bumps the owning schema's `updated_at`. Persistence is the
//! caller's job and always writes the full schema collection.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ApiError;
use crate::models::{
    new_id, Field, FieldType, Position, Relation, RelationType, Schema, Table,
};
use crate::template;

/// Upper bound on rows produced by one generation request.
pub const MAX_GENERATED_ROWS: usize = 1000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSchema {
    pub name: Option<String>,
    pub tables: Option<Vec<Table>>,
    pub relations: Option<Vec<Relation>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTable {
    pub name: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTable {
    pub name: Option<String>,
    pub fields: Option<Vec<Field>>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    pub faker_template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateField {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub required: Option<bool>,
    pub faker_template: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRelation {
    pub from_table: String,
    pub to_table: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub from_field: Option<String>,
    pub to_field: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRelation {
    pub from_table: Option<String>,
    pub to_table: Option<String>,
    #[serde(rename = "type")]
    pub relation_type: Option<RelationType>,
    pub from_field: Option<String>,
    pub to_field: Option<String>,
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: Vec<Schema>,
}

impl SchemaRegistry {
    pub fn from_records(schemas: Vec<Schema>) -> Self {
        Self { schemas }
    }

    pub fn records(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn find_all(&self) -> Vec<Schema> {
        self.schemas.clone()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.id == id)
    }

    fn schema_mut(&mut self, id: &str) -> Result<&mut Schema, ApiError> {
        self.schemas
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(ApiError::NotFound("Schema"))
    }

    /// Runs `f` against a schema and stamps `updated_at` if it succeeds.
    fn mutate<R>(
        &mut self,
        schema_id: &str,
        f: impl FnOnce(&mut Schema) -> Result<R, ApiError>,
    ) -> Result<R, ApiError> {
        let schema = self.schema_mut(schema_id)?;
        let result = f(schema)?;
        schema.updated_at = Utc::now();
        Ok(result)
    }

    pub fn create(&mut self, name: &str) -> Result<Schema, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("Schema name is required".to_string()));
        }
        let now = Utc::now();
        let schema = Schema {
            id: new_id(),
            name: name.to_string(),
            tables: Vec::new(),
            relations: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.schemas.push(schema.clone());
        Ok(schema)
    }

    pub fn update(&mut self, id: &str, dto: UpdateSchema) -> Result<Schema, ApiError> {
        self.mutate(id, |schema| {
            if let Some(name) = dto.name {
                schema.name = name;
            }
            if let Some(tables) = dto.tables {
                schema.tables = tables;
            }
            if let Some(relations) = dto.relations {
                schema.relations = relations;
            }
            Ok(())
        })?;
        self.find_by_id(id)
            .cloned()
            .ok_or(ApiError::NotFound("Schema"))
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.schemas.len();
        self.schemas.retain(|s| s.id != id);
        self.schemas.len() != before
    }

    pub fn add_table(&mut self, schema_id: &str, dto: NewTable) -> Result<Table, ApiError> {
        self.mutate(schema_id, |schema| {
            let offset = 100.0 + schema.tables.len() as f64 * 50.0;
            let table = Table {
                id: new_id(),
                name: dto.name,
                fields: Vec::new(),
                position: dto.position.unwrap_or(Position {
                    x: offset,
                    y: offset,
                }),
            };
            schema.tables.push(table.clone());
            Ok(table)
        })
    }

    pub fn update_table(
        &mut self,
        schema_id: &str,
        table_id: &str,
        dto: UpdateTable,
    ) -> Result<Table, ApiError> {
        self.mutate(schema_id, |schema| {
            let table = table_mut(schema, table_id)?;
            if let Some(name) = dto.name {
                table.name = name;
            }
            if let Some(fields) = dto.fields {
                table.fields = fields;
            }
            if let Some(position) = dto.position {
                table.position = position;
            }
            Ok(table.clone())
        })
    }

    /// Removes the table and every relation that references it.
    pub fn delete_table(&mut self, schema_id: &str, table_id: &str) -> Result<(), ApiError> {
        self.mutate(schema_id, |schema| {
            let before = schema.tables.len();
            schema.tables.retain(|t| t.id != table_id);
            if schema.tables.len() == before {
                return Err(ApiError::NotFound("Table"));
            }
            schema.relations.retain(|r| !r.touches(table_id));
            Ok(())
        })
    }

    pub fn update_table_position(
        &mut self,
        schema_id: &str,
        table_id: &str,
        position: Position,
    ) -> Result<(), ApiError> {
        self.mutate(schema_id, |schema| {
            table_mut(schema, table_id)?.position = position;
            Ok(())
        })
    }

    pub fn add_field(
        &mut self,
        schema_id: &str,
        table_id: &str,
        dto: NewField,
    ) -> Result<Field, ApiError> {
        if dto.name.trim().is_empty() {
            return Err(ApiError::Validation("Field name is required".to_string()));
        }
        self.mutate(schema_id, |schema| {
            let field = Field {
                id: new_id(),
                name: dto.name,
                field_type: dto.field_type,
                required: dto.required,
                faker_template: dto.faker_template,
            };
            table_mut(schema, table_id)?.fields.push(field.clone());
            Ok(field)
        })
    }

    pub fn update_field(
        &mut self,
        schema_id: &str,
        table_id: &str,
        field_id: &str,
        dto: UpdateField,
    ) -> Result<Field, ApiError> {
        self.mutate(schema_id, |schema| {
            let field = table_mut(schema, table_id)?
                .fields
                .iter_mut()
                .find(|f| f.id == field_id)
                .ok_or(ApiError::NotFound("Field"))?;
            if let Some(name) = dto.name {
                field.name = name;
            }
            if let Some(field_type) = dto.field_type {
                field.field_type = field_type;
            }
            if let Some(required) = dto.required {
                field.required = required;
            }
            if let Some(faker_template) = dto.faker_template {
                field.faker_template = Some(faker_template).filter(|t| !t.is_empty());
            }
            Ok(field.clone())
        })
    }

    pub fn delete_field(
        &mut self,
        schema_id: &str,
        table_id: &str,
        field_id: &str,
    ) -> Result<(), ApiError> {
        self.mutate(schema_id, |schema| {
            let table = table_mut(schema, table_id)?;
            let before = table.fields.len();
            table.fields.retain(|f| f.id != field_id);
            if table.fields.len() == before {
                return Err(ApiError::NotFound("Field"));
            }
            Ok(())
        })
    }

    pub fn add_relation(
        &mut self,
        schema_id: &str,
        dto: NewRelation,
    ) -> Result<Relation, ApiError> {
        self.mutate(schema_id, |schema| {
            for table_id in [&dto.from_table, &dto.to_table] {
                if !schema.tables.iter().any(|t| &t.id == table_id) {
                    return Err(ApiError::NotFound("Table"));
                }
            }
            let relation = Relation {
                id: new_id(),
                from_table: dto.from_table,
                to_table: dto.to_table,
                relation_type: dto.relation_type,
                from_field: dto.from_field,
                to_field: dto.to_field,
            };
            schema.relations.push(relation.clone());
            Ok(relation)
        })
    }

    pub fn update_relation(
        &mut self,
        schema_id: &str,
        relation_id: &str,
        dto: UpdateRelation,
    ) -> Result<Relation, ApiError> {
        self.mutate(schema_id, |schema| {
            let relation = schema
                .relations
                .iter_mut()
                .find(|r| r.id == relation_id)
                .ok_or(ApiError::NotFound("Relation"))?;
            if let Some(from_table) = dto.from_table {
                relation.from_table = from_table;
            }
            if let Some(to_table) = dto.to_table {
                relation.to_table = to_table;
            }
            if let Some(relation_type) = dto.relation_type {
                relation.relation_type = relation_type;
            }
            if dto.from_field.is_some() {
                relation.from_field = dto.from_field;
            }
            if dto.to_field.is_some() {
                relation.to_field = dto.to_field;
            }
            Ok(relation.clone())
        })
    }

    pub fn delete_relation(&mut self, schema_id: &str, relation_id: &str) -> Result<(), ApiError> {
        self.mutate(schema_id, |schema| {
            let before = schema.relations.len();
            schema.relations.retain(|r| r.id != relation_id);
            if schema.relations.len() == before {
                return Err(ApiError::NotFound("Relation"));
            }
            Ok(())
        })
    }

    pub fn find_table(&self, schema_id: &str, table_id: &str) -> Option<&Table> {
        self.find_by_id(schema_id)
            .and_then(|s| s.tables.iter().find(|t| t.id == table_id))
    }

    /// Rows for a table looked up in place. Unknown schema or table yields
    /// no rows. Callers holding the state lock should clone the table and
    /// use [`generate_rows`] instead.
    pub fn generate_from_table(&self, schema_id: &str, table_id: &str, count: usize) -> Vec<Value> {
        self.find_table(schema_id, table_id)
            .map_or_else(Vec::new, |table| generate_rows(table, count))
    }
}

/// Builds `count` rows keyed by field name, at most [`MAX_GENERATED_ROWS`].
/// A table without fields yields no rows.
pub fn generate_rows(table: &Table, count: usize) -> Vec<Value> {
    if table.fields.is_empty() {
        return Vec::new();
    }
    (0..count.min(MAX_GENERATED_ROWS))
        .map(|_| {
            let row: Map<String, Value> = table
                .fields
                .iter()
                .map(|field| (field.name.clone(), generate_field(field)))
                .collect();
            Value::Object(row)
        })
        .collect()
}

fn table_mut<'a>(schema: &'a mut Schema, table_id: &str) -> Result<&'a mut Table, ApiError> {
    schema
        .tables
        .iter_mut()
        .find(|t| t.id == table_id)
        .ok_or(ApiError::NotFound("Table"))
}

fn generate_field(field: &Field) -> Value {
    let key = match field.faker_template.as_deref() {
        Some(t) if !t.trim().is_empty() => template::token_key(t),
        _ => field.field_type.default_generator(),
    };
    template::generate(key).unwrap_or_else(|err| {
        warn!(field = %field.name, error = %err, "field generator fallback");
        match field.field_type {
            FieldType::String => Value::String("sample".to_string()),
            _ => Value::Null,
        }
    })
}
