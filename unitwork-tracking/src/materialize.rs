//! Turns stored rows back into entities.
//!
//! An entity is deserialized from a JSON object holding its scalars plus
//! every included navigation, assembled recursively from the store.

use crate::session::SchemaRegistry;
use crate::store::RowStore;
use crate::TrackingResult;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tracing::warn;
use unitwork_model::{EntitySchema, Properties};
use unitwork_query::IncludeTree;
use unitwork_types::NodeKey;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Builds the JSON document of `node`: `scalars` plus the navigations
/// named in `includes`, each loaded and assembled in turn.
pub fn assemble<'a, S: RowStore + ?Sized>(
    store: &'a S,
    schemas: &'a SchemaRegistry,
    schema: &'a EntitySchema,
    node: NodeKey,
    scalars: Properties,
    includes: &'a IncludeTree,
) -> BoxFuture<'a, TrackingResult<Value>> {
    Box::pin(async move {
        let mut object = scalars.into_object();
        for (name, subtree) in includes.iter() {
            let Some(descriptor) = schema.resolve(name) else {
                warn!("{} has no navigation {}, skipping include", schema.entity_type(), name);
                continue;
            };
            let Some(target_type) = descriptor.target() else {
                continue;
            };
            let Some(target_schema) = schemas.get(target_type) else {
                warn!("No schema registered for {}, skipping include {}", target_type, name);
                continue;
            };

            let value = if descriptor.is_collection() {
                let mut items = Vec::new();
                for member in store.load_collection(&node, descriptor.name).await? {
                    if let Some(row) = store.fetch(&member).await? {
                        items.push(assemble(store, schemas, target_schema, member, row, subtree).await?);
                    }
                }
                Value::Array(items)
            } else {
                let target = store.load_reference(&node, descriptor.name).await?;
                match target {
                    Some(target) => match store.fetch(&target).await? {
                        Some(row) => assemble(store, schemas, target_schema, target, row, subtree).await?,
                        None => Value::Null,
                    },
                    None => Value::Null,
                }
            };
            object.insert(descriptor.name.to_string(), value);
        }
        Ok(Value::Object(object))
    })
}
