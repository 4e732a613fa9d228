/*
 * Copyright 2020 Damian Peckett <damian@pecke.tt>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::error::*;
use crate::kubernetes::deployment::KubernetesDeploymentResource;
use crate::kubernetes::statefulset::KubernetesStatefulSetResource;
use crate::resource::ScaledObject;
use crate::state::SavedState;
use async_trait::async_trait;
use clap::ValueEnum;
use enum_dispatch::enum_dispatch;
use kube::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

mod common;
pub mod deployment;
#[cfg(test)]
pub(crate) mod fake;
pub mod scaled_object;
pub mod statefulset;
pub mod store;

/// Kubernetes workload kinds we know how to suspend.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    #[value(name = "statefulset")]
    StatefulSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::Deployment => write!(f, "Deployment"),
            WorkloadKind::StatefulSet => write!(f, "StatefulSet"),
        }
    }
}

/// A scalable workload selected for suspension or restoration.
#[derive(Clone, Debug, PartialEq)]
pub struct Workload {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    /// Replica count as of the listing.
    pub replicas: u32,
}

/// Result of a create call that tolerates the object already being there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Created {
    Created,
    AlreadyExists,
}

/// Everything the scale controller needs from the cluster.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// List workloads in a namespace matching every one of the supplied labels.
    async fn list_workloads(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Workload>, Error>;

    /// Set the replica count of a workload.
    async fn scale_workload(&self, workload: &Workload, replicas: u32) -> Result<(), Error>;

    /// Retrieve a scaled object, `None` if it doesn't exist.
    async fn get_scaled_object(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, Error>;

    /// Delete a scaled object. Deleting a missing object is not an error.
    async fn delete_scaled_object(&self, namespace: &str, name: &str) -> Result<(), Error>;

    async fn create_scaled_object(
        &self,
        namespace: &str,
        scaled_object: &ScaledObject,
    ) -> Result<Created, Error>;

    /// Retrieve a saved-state record by name, `None` if it doesn't exist.
    async fn get_saved_state(
        &self,
        namespace: &str,
        record_name: &str,
    ) -> Result<Option<SavedState>, Error>;

    async fn create_saved_state(
        &self,
        namespace: &str,
        state: &SavedState,
    ) -> Result<Created, Error>;

    /// Replace the contents of an existing saved-state record.
    async fn update_saved_state(&self, namespace: &str, state: &SavedState) -> Result<(), Error>;

    /// Delete a saved-state record. Deleting a missing record is not an error.
    async fn delete_saved_state(&self, namespace: &str, record_name: &str) -> Result<(), Error>;
}

/// Kubernetes workload resource families.
#[enum_dispatch]
pub enum WorkloadResource {
    /// apps/v1 Deployment resources within a namespace.
    Deployment(KubernetesDeploymentResource),
    /// apps/v1 StatefulSet resources within a namespace.
    StatefulSet(KubernetesStatefulSetResource),
}

impl WorkloadResource {
    pub fn new(kube_client: Client, kind: WorkloadKind, namespace: &str) -> Self {
        match kind {
            WorkloadKind::Deployment => {
                KubernetesDeploymentResource::new(kube_client, namespace).into()
            }
            WorkloadKind::StatefulSet => {
                KubernetesStatefulSetResource::new(kube_client, namespace).into()
            }
        }
    }
}

#[async_trait]
#[enum_dispatch(WorkloadResource)]
pub trait WorkloadResourceTrait {
    /// Retrieve the workloads matching a label selector from the k8s api.
    async fn list(&self, label_selector: &str) -> Result<Vec<Workload>, Error>;
    /// Update the number of replicas of a named workload.
    async fn scale(&self, name: &str, replicas: u32) -> Result<(), Error>;
}

/// The cluster, as seen through a single long lived kubernetes client.
pub struct KubernetesCluster {
    kube_client: Client,
    kinds: Vec<WorkloadKind>,
}

impl KubernetesCluster {
    pub fn new(kube_client: Client, kinds: Vec<WorkloadKind>) -> Self {
        Self { kube_client, kinds }
    }
}

#[async_trait]
impl Cluster for KubernetesCluster {
    async fn list_workloads(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Workload>, Error> {
        let label_selector = common::build_label_selector(match_labels);
        let mut workloads = Vec::new();
        for kind in &self.kinds {
            let resource = WorkloadResource::new(self.kube_client.clone(), *kind, namespace);
            workloads.extend(resource.list(&label_selector).await?);
        }
        Ok(workloads)
    }

    async fn scale_workload(&self, workload: &Workload, replicas: u32) -> Result<(), Error> {
        WorkloadResource::new(self.kube_client.clone(), workload.kind, &workload.namespace)
            .scale(&workload.name, replicas)
            .await
    }

    async fn get_scaled_object(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, Error> {
        scaled_object::get(self.kube_client.clone(), namespace, name).await
    }

    async fn delete_scaled_object(&self, namespace: &str, name: &str) -> Result<(), Error> {
        scaled_object::delete(self.kube_client.clone(), namespace, name).await
    }

    async fn create_scaled_object(
        &self,
        namespace: &str,
        scaled_object: &ScaledObject,
    ) -> Result<Created, Error> {
        scaled_object::create(self.kube_client.clone(), namespace, scaled_object).await
    }

    async fn get_saved_state(
        &self,
        namespace: &str,
        record_name: &str,
    ) -> Result<Option<SavedState>, Error> {
        store::get(self.kube_client.clone(), namespace, record_name).await
    }

    async fn create_saved_state(
        &self,
        namespace: &str,
        state: &SavedState,
    ) -> Result<Created, Error> {
        store::create(self.kube_client.clone(), namespace, state).await
    }

    async fn update_saved_state(&self, namespace: &str, state: &SavedState) -> Result<(), Error> {
        store::update(self.kube_client.clone(), namespace, state).await
    }

    async fn delete_saved_state(&self, namespace: &str, record_name: &str) -> Result<(), Error> {
        store::delete(self.kube_client.clone(), namespace, record_name).await
    }
}
