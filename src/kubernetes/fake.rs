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

//! In-memory cluster used by the controller tests.

use crate::error::*;
use crate::kubernetes::common::build_label_selector;
use crate::kubernetes::{Cluster, Created, Workload, WorkloadKind};
use crate::resource::ScaledObject;
use crate::state::SavedState;
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::error::ErrorResponse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Every call made against the fake, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    ListWorkloads { selector: String },
    Scale { name: String, replicas: u32 },
    GetScaledObject { name: String },
    DeleteScaledObject { name: String },
    CreateScaledObject { name: String },
    GetSavedState { record: String },
    CreateSavedState { record: String },
    UpdateSavedState { record: String },
    DeleteSavedState { record: String },
}

impl Call {
    /// Whether the call changes cluster state.
    pub(crate) fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::ListWorkloads { .. } | Call::GetScaledObject { .. } | Call::GetSavedState { .. }
        )
    }
}

#[derive(Default)]
struct State {
    /// Workloads along with their labels.
    workloads: Vec<(Workload, BTreeMap<String, String>)>,
    scaled_objects: HashMap<String, ScaledObject>,
    /// Deleted scaled objects that stay visible for a number of further reads.
    lingering: HashMap<String, (ScaledObject, usize)>,
    config_maps: HashMap<String, ConfigMap>,
    fail_scale: Option<String>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_workload(
        self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        replicas: u32,
        labels: &[(&str, &str)],
    ) -> Self {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.state.lock().unwrap().workloads.push((
            Workload {
                kind,
                namespace: namespace.into(),
                name: name.into(),
                replicas,
            },
            labels,
        ));
        self
    }

    /// A non-production deployment.
    pub(crate) fn with_deployment(self, namespace: &str, name: &str, replicas: u32) -> Self {
        self.with_workload(
            WorkloadKind::Deployment,
            namespace,
            name,
            replicas,
            &[("environment", "non-production")],
        )
    }

    pub(crate) fn with_scaled_object(self, scaled_object: ScaledObject) -> Self {
        let name = scaled_object.metadata.name.clone().unwrap();
        self.state
            .lock()
            .unwrap()
            .scaled_objects
            .insert(name, scaled_object);
        self
    }

    /// Keep deleted scaled objects visible for `reads` further reads.
    pub(crate) fn with_lingering_deletes(self, name: &str, reads: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .lingering
            .insert(name.into(), (placeholder(name), reads));
        self
    }

    /// Make scale calls against the named workload fail with a server error.
    pub(crate) fn with_failing_scale(self, name: &str) -> Self {
        self.state.lock().unwrap().fail_scale = Some(name.into());
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub(crate) fn replicas(&self, name: &str) -> Option<u32> {
        self.state
            .lock()
            .unwrap()
            .workloads
            .iter()
            .find(|(workload, _)| workload.name == name)
            .map(|(workload, _)| workload.replicas)
    }

    pub(crate) fn scaled_object(&self, name: &str) -> Option<ScaledObject> {
        self.state.lock().unwrap().scaled_objects.get(name).cloned()
    }

    pub(crate) fn config_map(&self, name: &str) -> Option<ConfigMap> {
        self.state.lock().unwrap().config_maps.get(name).cloned()
    }

    /// Place a raw ConfigMap, as a foreign writer would have.
    pub(crate) fn insert_config_map(&self, config_map: ConfigMap) {
        let name = config_map.metadata.name.clone().unwrap();
        self.state
            .lock()
            .unwrap()
            .config_maps
            .insert(name, config_map);
    }

    /// Place a record directly, as an earlier run would have.
    pub(crate) fn insert_saved_state(&self, state: &SavedState) {
        let config_map = state.to_config_map(Utc::now()).unwrap();
        self.state
            .lock()
            .unwrap()
            .config_maps
            .insert(state.record_name(), config_map);
    }
}

/// Lingering entries are armed before the object exists, the real copy replaces this on delete.
fn placeholder(name: &str) -> ScaledObject {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "keda.sh/v1alpha1",
        "kind": "ScaledObject",
        "metadata": { "name": name },
        "spec": { "scaleTargetRef": { "name": name }, "triggers": [] }
    }))
    .unwrap()
}

fn server_error(message: &str) -> Error {
    Error::Kube {
        source: kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: message.into(),
            reason: "InternalError".into(),
            code: 500,
        }),
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn list_workloads(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Workload>, Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListWorkloads {
            selector: build_label_selector(match_labels),
        });
        Ok(state
            .workloads
            .iter()
            .filter(|(workload, labels)| {
                workload.namespace == namespace
                    && match_labels
                        .iter()
                        .all(|(key, value)| labels.get(key) == Some(value))
            })
            .map(|(workload, _)| workload.clone())
            .collect())
    }

    async fn scale_workload(&self, workload: &Workload, replicas: u32) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Scale {
            name: workload.name.clone(),
            replicas,
        });
        if state.fail_scale.as_deref() == Some(workload.name.as_str()) {
            return Err(server_error("scale rejected"));
        }
        if let Some((existing, _)) = state
            .workloads
            .iter_mut()
            .find(|(existing, _)| {
                existing.namespace == workload.namespace && existing.name == workload.name
            })
        {
            existing.replicas = replicas;
        }
        Ok(())
    }

    async fn get_scaled_object(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetScaledObject { name: name.into() });
        if let Some(scaled_object) = state.scaled_objects.get(name) {
            return Ok(Some(scaled_object.clone()));
        }
        if let Some((scaled_object, reads)) = state.lingering.get_mut(name) {
            if *reads > 0 {
                *reads -= 1;
                return Ok(Some(scaled_object.clone()));
            }
        }
        Ok(None)
    }

    async fn delete_scaled_object(&self, _namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteScaledObject { name: name.into() });
        if let Some(scaled_object) = state.scaled_objects.remove(name) {
            if let Some(lingering) = state.lingering.get_mut(name) {
                lingering.0 = scaled_object;
            }
        }
        Ok(())
    }

    async fn create_scaled_object(
        &self,
        _namespace: &str,
        scaled_object: &ScaledObject,
    ) -> Result<Created, Error> {
        let name = scaled_object.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateScaledObject { name: name.clone() });
        if state.scaled_objects.contains_key(&name) {
            return Ok(Created::AlreadyExists);
        }
        state.scaled_objects.insert(name, scaled_object.clone());
        Ok(Created::Created)
    }

    async fn get_saved_state(
        &self,
        _namespace: &str,
        record_name: &str,
    ) -> Result<Option<SavedState>, Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetSavedState {
            record: record_name.into(),
        });
        match state.config_maps.get(record_name) {
            Some(config_map) => Ok(Some(SavedState::from_config_map(config_map)?)),
            None => Ok(None),
        }
    }

    async fn create_saved_state(
        &self,
        _namespace: &str,
        saved_state: &SavedState,
    ) -> Result<Created, Error> {
        let record = saved_state.record_name();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateSavedState {
            record: record.clone(),
        });
        if state.config_maps.contains_key(&record) {
            return Ok(Created::AlreadyExists);
        }
        let config_map = saved_state.to_config_map(Utc::now())?;
        state.config_maps.insert(record, config_map);
        Ok(Created::Created)
    }

    async fn update_saved_state(
        &self,
        _namespace: &str,
        saved_state: &SavedState,
    ) -> Result<(), Error> {
        let record = saved_state.record_name();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpdateSavedState {
            record: record.clone(),
        });
        let config_map = saved_state.to_config_map(Utc::now())?;
        state.config_maps.insert(record, config_map);
        Ok(())
    }

    async fn delete_saved_state(&self, _namespace: &str, record_name: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteSavedState {
            record: record_name.into(),
        });
        state.config_maps.remove(record_name);
        Ok(())
    }
}
