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
use crate::kubernetes::common::replicas_patch;
use crate::kubernetes::{Workload, WorkloadKind, WorkloadResourceTrait};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use snafu::{OptionExt, ResultExt};

/// Kubernetes StatefulSet resource kind related functions.
pub struct KubernetesStatefulSetResource {
    kube_client: Client,
    namespace: String,
}

impl KubernetesStatefulSetResource {
    pub fn new(kube_client: Client, namespace: &str) -> Self {
        Self {
            kube_client,
            namespace: namespace.into(),
        }
    }

    fn api(&self) -> Api<StatefulSet> {
        Api::namespaced(self.kube_client.clone(), &self.namespace)
    }
}

#[async_trait]
impl WorkloadResourceTrait for KubernetesStatefulSetResource {
    async fn list(&self, label_selector: &str) -> Result<Vec<Workload>, Error> {
        // Retrieve the list of StatefulSet objects matching the label selector.
        let statefulsets = self
            .api()
            .list(&ListParams::default().labels(label_selector))
            .await
            .context(KubeSnafu)?;
        let mut workloads: Vec<Workload> = Vec::new();
        for statefulset in statefulsets {
            let replicas = statefulset
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .context(KubeSpecSnafu)?;
            workloads.push(Workload {
                kind: WorkloadKind::StatefulSet,
                namespace: statefulset
                    .metadata
                    .namespace
                    .clone()
                    .unwrap_or_else(|| self.namespace.clone()),
                name: statefulset.metadata.name.clone().context(KubeSpecSnafu)?,
                replicas: replicas.max(0) as u32,
            });
        }
        Ok(workloads)
    }

    async fn scale(&self, name: &str, replicas: u32) -> Result<(), Error> {
        let patch = replicas_patch(replicas, Utc::now());
        // Patch (update) the StatefulSet object.
        self.api()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .context(KubeSnafu)?;
        Ok(())
    }
}
