//! Typed resource API over the raw store client.

use crate::error::StoreError;
use crate::store_trait::StoreClient;
use models::{DynamicObject, ResourceMeta};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed wrapper around `Arc<dyn StoreClient>` for one resource type,
/// mirroring the store's scoping rules.
pub struct Api<T> {
    client: Arc<dyn StoreClient>,
    namespace: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Api<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Api<T>
where
    T: ResourceMeta + Serialize + DeserializeOwned,
{
    /// API for a cluster-scoped resource.
    pub fn cluster(client: Arc<dyn StoreClient>) -> Self {
        Self {
            client,
            namespace: None,
            _marker: PhantomData,
        }
    }

    /// API scoped to one namespace.
    pub fn namespaced(client: Arc<dyn StoreClient>, namespace: &str) -> Self {
        Self {
            client,
            namespace: Some(namespace.to_string()),
            _marker: PhantomData,
        }
    }

    /// API listing a namespaced resource across every namespace.
    pub fn all(client: Arc<dyn StoreClient>) -> Self {
        Self {
            client,
            namespace: None,
            _marker: PhantomData,
        }
    }

    fn object_namespace<'a>(&'a self, obj: &'a T) -> Option<&'a str> {
        if T::NAMESPACED {
            obj.metadata()
                .namespace
                .as_deref()
                .or(self.namespace.as_deref())
        } else {
            None
        }
    }

    pub async fn list(&self, selectors: &[(&str, &str)]) -> Result<Vec<T>, StoreError> {
        let list = self
            .client
            .list(T::PLURAL, self.namespace.as_deref(), selectors)
            .await?;
        let mut items = Vec::with_capacity(list.items.len());
        for obj in &list.items {
            items.push(obj.to_typed()?);
        }
        Ok(items)
    }

    pub async fn get(&self, name: &str) -> Result<T, StoreError> {
        let obj = self
            .client
            .get(T::PLURAL, self.namespace.as_deref(), name)
            .await?;
        Ok(obj.to_typed()?)
    }

    /// Get, mapping NotFound to None.
    pub async fn get_opt(&self, name: &str) -> Result<Option<T>, StoreError> {
        match self.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create(&self, obj: &T) -> Result<T, StoreError> {
        let raw = DynamicObject::from_typed(obj)?;
        let created = self
            .client
            .create(T::PLURAL, self.object_namespace(obj), &raw)
            .await?;
        Ok(created.to_typed()?)
    }

    /// Full replace keyed by the object's own name; fails with
    /// [`StoreError::Conflict`] on a stale resourceVersion.
    pub async fn save(&self, obj: &T) -> Result<T, StoreError> {
        let raw = DynamicObject::from_typed(obj)?;
        let name = obj.metadata().name.clone();
        let saved = self
            .client
            .replace(T::PLURAL, self.object_namespace(obj), &name, &raw)
            .await?;
        Ok(saved.to_typed()?)
    }

    pub async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        let ns = if T::NAMESPACED {
            namespace.or(self.namespace.as_deref())
        } else {
            None
        };
        self.client.delete(T::PLURAL, ns, name).await
    }
}
