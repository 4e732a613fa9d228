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
use crate::resource::{ScaledObject, ANNOTATION_BASE};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;

/// Suffix appended to a workload name to derive its record name.
const RECORD_SUFFIX: &str = "-configmap";
/// Record field holding the saved replica count.
const REPLICAS_FIELD: &str = "replicas";
/// Record field holding the saved scaled object, as JSON.
const SCALED_OBJECT_FIELD: &str = "scaled_object";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "hibernator";

/// Name of the ConfigMap holding the saved state of a workload.
pub fn record_name(workload_name: &str) -> String {
    format!("{}{}", workload_name, RECORD_SUFFIX)
}

/// The scaling configuration of a workload, captured before it was scaled to zero.
#[derive(Clone, Debug)]
pub struct SavedState {
    pub workload_name: String,
    /// Replica count at the time of suspension.
    pub replicas: u32,
    /// The workload's scaled object, if it had one.
    pub scaled_object: Option<ScaledObject>,
}

impl SavedState {
    pub fn new(workload_name: &str, replicas: u32, scaled_object: Option<ScaledObject>) -> Self {
        Self {
            workload_name: workload_name.into(),
            replicas,
            scaled_object,
        }
    }

    pub fn record_name(&self) -> String {
        record_name(&self.workload_name)
    }

    /// How many replicas to restore. A scaled object's minimum wins over the raw count.
    pub fn desired_replicas(&self) -> u32 {
        match &self.scaled_object {
            Some(scaled_object) => scaled_object.spec.min_replicas(),
            None => self.replicas,
        }
    }

    /// Encode the saved state as a ConfigMap.
    pub fn to_config_map(&self, saved_at: DateTime<Utc>) -> Result<ConfigMap, Error> {
        let mut data = BTreeMap::new();
        data.insert(REPLICAS_FIELD.to_string(), self.replicas.to_string());
        if let Some(scaled_object) = &self.scaled_object {
            data.insert(
                SCALED_OBJECT_FIELD.to_string(),
                serde_json::to_string(scaled_object).context(JsonSerializationSnafu)?,
            );
        }

        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
        labels.insert(
            format!("{}/workload", ANNOTATION_BASE),
            self.workload_name.clone(),
        );

        let mut annotations = BTreeMap::new();
        annotations.insert(
            format!("{}/saved-at", ANNOTATION_BASE),
            saved_at.to_rfc3339(),
        );

        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.record_name()),
                labels: Some(labels),
                annotations: Some(annotations),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        })
    }

    /// Decode a ConfigMap written by `to_config_map`.
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self, Error> {
        let key = config_map.metadata.name.clone().context(KubeSpecSnafu)?;
        let workload_name = key
            .strip_suffix(RECORD_SUFFIX)
            .context(KubeSpecSnafu)?
            .to_string();
        let data = config_map.data.as_ref();

        let replicas = data
            .and_then(|data| data.get(REPLICAS_FIELD))
            .context(MissingReplicasSnafu { key: key.clone() })?
            .trim()
            .parse::<u32>()
            .context(SavedReplicasSnafu { key: key.clone() })?;

        let scaled_object = match data.and_then(|data| data.get(SCALED_OBJECT_FIELD)) {
            Some(encoded) => Some(
                serde_json::from_str::<ScaledObject>(encoded)
                    .context(SavedScaledObjectSnafu { key: key.clone() })?,
            ),
            None => None,
        };

        Ok(Self {
            workload_name,
            replicas,
            scaled_object,
        })
    }
}
