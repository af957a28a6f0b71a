use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
    KeyType, Projection, ProjectionType, ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;

use crate::traits::{
    StorageError, StorageResult, TableItem, TableSchema, TableSink, TableState, TableValue,
};

/// DynamoDB table sink
#[derive(Clone)]
pub struct DynamoTableSink {
    client: Client,
    table_name: String,
    name: String,
}

impl DynamoTableSink {
    pub fn new(config: &SdkConfig, table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self {
            client: Client::new(config),
            name: format!("dynamodb://{}", table_name),
            table_name,
        }
    }
}

fn to_attribute(value: TableValue) -> AttributeValue {
    match value {
        TableValue::S(s) => AttributeValue::S(s),
        TableValue::N(n) => AttributeValue::N(n.to_string()),
        TableValue::Bool(b) => AttributeValue::Bool(b),
    }
}

fn build_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::ConfigError(format!("invalid table definition: {}", e))
}

fn key_element(name: &str, key_type: KeyType) -> StorageResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(build_error)
}

fn string_attribute(name: &str) -> StorageResult<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(build_error)
}

#[async_trait]
impl TableSink for DynamoTableSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, item), fields(aws.service.name = "dynamodb", table = %self.table_name))]
    async fn put_item(&self, item: TableItem) -> StorageResult<()> {
        let item: HashMap<String, AttributeValue> = item
            .into_iter()
            .map(|(k, v)| (k, to_attribute(v)))
            .collect();

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::WriteFailed(DisplayErrorContext(&e).to_string()))
    }

    async fn describe_table(&self) -> StorageResult<TableState> {
        match self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
        {
            Ok(out) => {
                let status = out.table().and_then(|t| t.table_status());
                Ok(match status {
                    Some(TableStatus::Active) => TableState::Active,
                    Some(TableStatus::Creating) | Some(TableStatus::Updating) | None => {
                        TableState::Creating
                    }
                    Some(other) => {
                        return Err(StorageError::TableNotReady {
                            table: self.table_name.clone(),
                            reason: format!("table status {}", other.as_str()),
                        })
                    }
                })
            }
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_resource_not_found_exception())
                    .unwrap_or(false) =>
            {
                Ok(TableState::Missing)
            }
            Err(e) => Err(StorageError::BackendError(DisplayErrorContext(&e).to_string())),
        }
    }

    #[tracing::instrument(skip(self, schema), fields(aws.service.name = "dynamodb", table = %schema.table_name))]
    async fn create_table(&self, schema: &TableSchema) -> StorageResult<()> {
        let index = GlobalSecondaryIndex::builder()
            .index_name(&schema.index_name)
            .key_schema(key_element(&schema.index_partition_key, KeyType::Hash)?)
            .key_schema(key_element(&schema.sort_key, KeyType::Range)?)
            .projection(
                Projection::builder()
                    .projection_type(ProjectionType::All)
                    .build(),
            )
            .build()
            .map_err(build_error)?;

        self.client
            .create_table()
            .table_name(&schema.table_name)
            .billing_mode(BillingMode::PayPerRequest)
            .key_schema(key_element(&schema.partition_key, KeyType::Hash)?)
            .key_schema(key_element(&schema.sort_key, KeyType::Range)?)
            .attribute_definitions(string_attribute(&schema.partition_key)?)
            .attribute_definitions(string_attribute(&schema.sort_key)?)
            .attribute_definitions(string_attribute(&schema.index_partition_key)?)
            .global_secondary_indexes(index)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::BackendError(DisplayErrorContext(&e).to_string()))?;

        tracing::info!("DynamoDB table creation started");
        Ok(())
    }
}
