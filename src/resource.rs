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

use kube::core::object::Object;
use kube::core::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A KEDA ScaledObject, the autoscaling descriptor we save and restore.
/// Status is owned by KEDA and dropped before recreation.
pub type ScaledObject = Object<ScaledObjectSpec, Value>;

/// Prefix to use for all object labels and annotations.
pub const ANNOTATION_BASE: &str = "hibernator.pangolinscaler.com";

/// KEDA api group.
pub const KEDA_GROUP: &str = "keda.sh";
/// KEDA api version serving ScaledObjects.
pub const KEDA_VERSION: &str = "v1alpha1";

/// Reference to the workload a ScaledObject drives.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ScaleTargetRef {
    /// Name of the target workload.
    pub name: String,
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "envSourceContainerName", default, skip_serializing_if = "Option::is_none")]
    pub env_source_container_name: Option<String>,
}

/// A single KEDA scaling trigger.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ScaledObjectTrigger {
    /// Scaler type, eg. `prometheus` or `cron`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Everything else (metadata, authenticationRef, metricType...) is kept as is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// KEDA ScaledObject specification.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ScaledObjectSpec {
    /// The workload being autoscaled.
    #[serde(rename = "scaleTargetRef")]
    pub scale_target_ref: ScaleTargetRef,
    /// Lower bound for the replica count, KEDA treats a missing value as zero.
    #[serde(rename = "minReplicaCount", default, skip_serializing_if = "Option::is_none")]
    pub min_replica_count: Option<u32>,
    /// Upper bound for the replica count.
    #[serde(rename = "maxReplicaCount", default, skip_serializing_if = "Option::is_none")]
    pub max_replica_count: Option<u32>,
    /// Scaling triggers.
    pub triggers: Vec<ScaledObjectTrigger>,
    /// Remaining spec fields, eg. pollingInterval, cooldownPeriod, advanced and fallback.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ScaledObjectSpec {
    /// The replica count KEDA will hold the workload at while idle.
    pub fn min_replicas(&self) -> u32 {
        self.min_replica_count.unwrap_or(0)
    }
}

/// Kubernetes api resource description for KEDA ScaledObjects.
pub fn scaled_object_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(KEDA_GROUP, KEDA_VERSION, "ScaledObject"),
        "scaledobjects",
    )
}

/// Clear every field the api server populates, so the object can be created again.
pub fn strip_server_fields(scaled_object: &mut ScaledObject) {
    let metadata = &mut scaled_object.metadata;
    metadata.resource_version = None;
    metadata.uid = None;
    metadata.creation_timestamp = None;
    metadata.deletion_timestamp = None;
    metadata.deletion_grace_period_seconds = None;
    metadata.generation = None;
    metadata.managed_fields = None;
    metadata.self_link = None;
    scaled_object.status = None;
}
