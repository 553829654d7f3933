//! MongoDB schema fetcher
//!
//! Collections play the role of tables. Field types come from the caller's
//! sampling/inference pass and are treated as given; the fetcher reads
//! indexes and counts from collection metadata. `_id` is always the primary
//! key and foreign keys do not exist.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::IndexModel;
use tokio_util::sync::CancellationToken;

use crate::engine::checksum;
use crate::engine::error::{SchemaError, SchemaResult};
use crate::engine::traits::SchemaFetcher;
use crate::engine::types::{
    constraint_kind, engines, Column, Connection, Constraint, ExampleRecord, Index,
    MongoConnection, Schema, Table, TableSelection,
};

use super::{bytes_to_json, ensure_live, log_partial};

/// MongoDB fetcher implementation
pub struct MongoFetcher;

impl MongoFetcher {
    pub fn new() -> Self {
        Self
    }

    fn connection<'a>(&self, conn: &'a Connection) -> SchemaResult<&'a MongoConnection> {
        match conn {
            Connection::Mongo(mongo) => Ok(mongo),
            _ => Err(SchemaError::catalog(
                self.engine(),
                "connection",
                "-",
                "connection handle is not a MongoDB client",
            )),
        }
    }

    async fn list_collections(&self, mongo: &MongoConnection) -> SchemaResult<Vec<String>> {
        let mut names = mongo
            .client
            .database(&mongo.database)
            .list_collection_names()
            .await
            .map_err(|e| {
                SchemaError::catalog(self.engine(), "collections", "-", e.to_string())
            })?;
        names.sort_unstable();
        Ok(names)
    }

    /// Builds the normalized table for one collection from inferred fields
    /// plus live index metadata.
    async fn build_table(
        &self,
        mongo: &MongoConnection,
        collection: &str,
    ) -> SchemaResult<Table> {
        let mut table = Table::new(collection);

        for field in mongo.inferred_fields.get(collection).into_iter().flatten() {
            table.column_order.push(field.name.clone());
            table.columns.insert(
                field.name.clone(),
                Column {
                    name: field.name.clone(),
                    data_type: field.bson_type.clone(),
                    nullable: field.nullable,
                    default_value: None,
                    comment: None,
                    auto_increment: false,
                },
            );
        }

        // `_id` exists on every document whether or not sampling saw it.
        if !table.columns.contains_key("_id") {
            table.column_order.insert(0, "_id".to_string());
            table.columns.insert(
                "_id".to_string(),
                Column {
                    name: "_id".to_string(),
                    data_type: "objectId".to_string(),
                    nullable: false,
                    default_value: None,
                    comment: None,
                    auto_increment: false,
                },
            );
        }

        table.constraints.insert(
            "PRIMARY".to_string(),
            Constraint {
                name: "PRIMARY".to_string(),
                kind: constraint_kind::PRIMARY_KEY.to_string(),
                definition: None,
                columns: vec!["_id".to_string()],
            },
        );

        match self.fetch_indexes(mongo, collection).await {
            Ok(indexes) => table.indexes = indexes,
            Err(e) => log_partial(self.engine(), &e),
        }

        Ok(table)
    }

    async fn fetch_indexes(
        &self,
        mongo: &MongoConnection,
        collection: &str,
    ) -> SchemaResult<HashMap<String, Index>> {
        let cursor = mongo
            .client
            .database(&mongo.database)
            .collection::<Document>(collection)
            .list_indexes()
            .await
            .map_err(|e| SchemaError::partial("indexes", collection, e.to_string()))?;

        let models: Vec<IndexModel> = cursor
            .try_collect()
            .await
            .map_err(|e| SchemaError::partial("indexes", collection, e.to_string()))?;

        let mut indexes = HashMap::new();
        for model in models {
            let columns: Vec<String> = model.keys.keys().map(|k| k.to_string()).collect();
            let options = model.options.as_ref();
            let name = options
                .and_then(|o| o.name.clone())
                .unwrap_or_else(|| default_index_name(&model.keys));
            let unique = options.and_then(|o| o.unique).unwrap_or(false)
                || name == "_id_";
            indexes.insert(name.clone(), Index { name, columns, unique });
        }
        Ok(indexes)
    }

    async fn fetch_row_count(
        &self,
        mongo: &MongoConnection,
        collection: &str,
    ) -> SchemaResult<u64> {
        mongo
            .client
            .database(&mongo.database)
            .collection::<Document>(collection)
            .estimated_document_count()
            .await
            .map_err(|e| SchemaError::partial("row_count", collection, e.to_string()))
    }
}

/// Server-side convention when an index has no explicit name.
fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(key, value)| match value {
            Bson::Int32(dir) => format!("{}_{}", key, dir),
            Bson::Int64(dir) => format!("{}_{}", key, dir),
            Bson::Double(dir) => format!("{}_{}", key, dir),
            other => format!("{}_{}", key, other),
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn bson_to_json(value: &Bson) -> serde_json::Value {
    use serde_json::{json, Value};

    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::ObjectId(oid) => json!(oid.to_hex()),
        Bson::String(s) => json!(s),
        Bson::Boolean(b) => json!(b),
        Bson::Int32(i) => json!(i),
        Bson::Int64(i) => json!(i),
        Bson::Double(f) if f.is_finite() => json!(f),
        Bson::Double(f) => json!(f.to_string()),
        Bson::Decimal128(d) => json!(d.to_string()),
        Bson::DateTime(dt) => json!(dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string())),
        Bson::Binary(bin) => bytes_to_json(bin.bytes.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(document) => Value::Object(
            document
                .iter()
                .map(|(k, v)| (k.to_string(), bson_to_json(v)))
                .collect(),
        ),
        other => serde_json::to_value(other).unwrap_or(Value::Null),
    }
}

fn document_to_record(document: &Document) -> ExampleRecord {
    document
        .iter()
        .map(|(key, value)| (key.to_string(), bson_to_json(value)))
        .collect()
}

impl Default for MongoFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaFetcher for MongoFetcher {
    fn engine(&self) -> &'static str {
        engines::MONGODB
    }

    async fn get_schema(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        selection: &TableSelection,
    ) -> SchemaResult<Schema> {
        let mongo = self.connection(conn)?;
        ensure_live(ctx)?;

        let collections = self.list_collections(mongo).await?;
        let mut schema = Schema::new();

        for name in collections {
            ensure_live(ctx)?;
            if !selection.includes(&name) {
                continue;
            }

            let mut table = self.build_table(mongo, &name).await?;

            ensure_live(ctx)?;
            match self.fetch_row_count(mongo, &name).await {
                Ok(count) => table.row_count = count,
                Err(e) => log_partial(self.engine(), &e),
            }

            schema.tables.insert(name, table);
        }

        checksum::seal(&mut schema);
        Ok(schema)
    }

    async fn table_checksum(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        table: &str,
    ) -> SchemaResult<String> {
        let mongo = self.connection(conn)?;
        ensure_live(ctx)?;
        let structure = self.build_table(mongo, table).await?;
        Ok(checksum::table_checksum(&structure))
    }

    async fn table_checksums(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
    ) -> SchemaResult<HashMap<String, String>> {
        let mongo = self.connection(conn)?;
        ensure_live(ctx)?;

        let mut checksums = HashMap::new();
        for name in self.list_collections(mongo).await? {
            ensure_live(ctx)?;
            let structure = self.build_table(mongo, &name).await?;
            checksums.insert(name, checksum::table_checksum(&structure));
        }
        Ok(checksums)
    }

    async fn example_records(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        table: &str,
        limit: u32,
    ) -> SchemaResult<Vec<ExampleRecord>> {
        let mongo = self.connection(conn)?;
        ensure_live(ctx)?;

        let cursor = mongo
            .client
            .database(&mongo.database)
            .collection::<Document>(table)
            .find(doc! {})
            .limit(limit as i64)
            .await
            .map_err(|e| SchemaError::partial("example_records", table, e.to_string()))?;

        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| SchemaError::partial("example_records", table, e.to_string()))?;

        Ok(documents.iter().map(document_to_record).collect())
    }
}
