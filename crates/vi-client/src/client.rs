//! HTTP implementation of the hypervisor client.
//!
//! Speaks the automation gateway's JSON API: GET for inventory lookups,
//! POST for mutations. Long-running mutations answer with a task id.

use crate::error::ViError;
use crate::models::*;
use crate::vi_trait::ViClient;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

#[derive(Clone)]
pub struct HttpViClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpViClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ViError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    async fn get_opt<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ViError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check(resp).await?;
        Ok(Some(resp.json().await?))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ViError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn post_unit(&self, path: &str, body: serde_json::Value) -> Result<(), ViError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ViError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().to_string();
        let message = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(ViError::NotFound(url)),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(ViError::InvalidRequest(message))
            }
            _ => Err(ViError::InvalidRequest(format!("{}: {}", status, message))),
        }
    }
}

#[async_trait::async_trait]
impl ViClient for HttpViClient {
    async fn find_datacenter(&self, name: &str) -> Result<Option<String>, ViError> {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }
        Ok(self
            .get_opt::<Named>(&format!("inventory/datacenters/{}", name))
            .await?
            .map(|n| n.name))
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<String>, ViError> {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }
        Ok(self
            .get_opt::<Named>(&format!("inventory/datastores/{}", name))
            .await?
            .map(|n| n.name))
    }

    async fn find_cluster(&self, name: &str) -> Result<Option<String>, ViError> {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }
        Ok(self
            .get_opt::<Named>(&format!("inventory/clusters/{}", name))
            .await?
            .map(|n| n.name))
    }

    async fn find_folder(&self, datacenter: &str, name: &str) -> Result<Option<String>, ViError> {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }
        Ok(self
            .get_opt::<Named>(&format!(
                "inventory/datacenters/{}/folders/{}",
                datacenter, name
            ))
            .await?
            .map(|n| n.name))
    }

    async fn find_port_group(&self, name: &str) -> Result<Option<String>, ViError> {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }
        Ok(self
            .get_opt::<Named>(&format!("inventory/port-groups/{}", name))
            .await?
            .map(|n| n.name))
    }

    async fn find_template(
        &self,
        datacenter: &str,
        name: &str,
    ) -> Result<Option<VmTemplate>, ViError> {
        self.get_opt(&format!(
            "inventory/datacenters/{}/templates/{}",
            datacenter, name
        ))
        .await
    }

    async fn list_hosts(&self, cluster: &str) -> Result<Vec<HostInfo>, ViError> {
        Ok(self
            .get_opt(&format!("inventory/clusters/{}/hosts", cluster))
            .await?
            .unwrap_or_default())
    }

    async fn find_vm(&self, name: &str) -> Result<Option<VmInfo>, ViError> {
        self.get_opt(&format!("vms/{}", name)).await
    }

    async fn find_disk(&self, datastore: &str, name: &str) -> Result<Option<DiskInfo>, ViError> {
        self.get_opt(&format!("datastores/{}/disks/{}", datastore, name))
            .await
    }

    async fn clone_vm(
        &self,
        template: &str,
        name: &str,
        placement: &VmPlacement,
        vcpus: u32,
        ram_mb: u64,
    ) -> Result<TaskRef, ViError> {
        self.post(
            "vms/clone",
            json!({
                "template": template,
                "name": name,
                "placement": placement,
                "vcpus": vcpus,
                "ramMb": ram_mb,
            }),
        )
        .await
    }

    async fn power_on(&self, vm: &str) -> Result<(), ViError> {
        self.post_unit(&format!("vms/{}/power-on", vm), json!({})).await
    }

    async fn power_off(&self, vm: &str, hard: bool) -> Result<(), ViError> {
        self.post_unit(&format!("vms/{}/power-off", vm), json!({ "hard": hard }))
            .await
    }

    async fn destroy_vm(&self, vm: &str) -> Result<(), ViError> {
        match self.post_unit(&format!("vms/{}/destroy", vm), json!({})).await {
            Ok(()) => Ok(()),
            // Already gone: at-least-once retries treat this as success.
            Err(ViError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_disk(
        &self,
        datastore: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<TaskRef, ViError> {
        self.post(
            &format!("datastores/{}/disks", datastore),
            json!({ "name": name, "sizeGb": size_gb }),
        )
        .await
    }

    async fn clone_disk(
        &self,
        datastore: &str,
        source: &str,
        name: &str,
    ) -> Result<TaskRef, ViError> {
        self.post(
            &format!("datastores/{}/disks/{}/clone", datastore, source),
            json!({ "name": name }),
        )
        .await
    }

    async fn grow_disk(
        &self,
        datastore: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<TaskRef, ViError> {
        self.post(
            &format!("datastores/{}/disks/{}/grow", datastore, name),
            json!({ "sizeGb": size_gb }),
        )
        .await
    }

    async fn attach_disk(&self, vm: &str, datastore: &str, name: &str) -> Result<(), ViError> {
        self.post_unit(
            &format!("vms/{}/attach-disk", vm),
            json!({ "datastore": datastore, "name": name }),
        )
        .await
    }

    async fn detach_disk(&self, vm: &str, datastore: &str, name: &str) -> Result<(), ViError> {
        self.post_unit(
            &format!("vms/{}/detach-disk", vm),
            json!({ "datastore": datastore, "name": name }),
        )
        .await
    }

    async fn delete_disk(&self, datastore: &str, name: &str) -> Result<(), ViError> {
        match self
            .post_unit(&format!("datastores/{}/disks/{}/delete", datastore, name), json!({}))
            .await
        {
            Ok(()) => Ok(()),
            Err(ViError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn poll_task(&self, task: &TaskRef) -> Result<TaskStatus, ViError> {
        self.get_opt(&format!("tasks/{}", task.id))
            .await?
            .ok_or_else(|| ViError::NotFound(format!("task {}", task.id)))
    }
}
