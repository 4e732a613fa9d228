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
use crate::kubernetes::common::{is_conflict, is_not_found};
use crate::kubernetes::Created;
use crate::state::SavedState;
use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use snafu::ResultExt;

/// Retrieve and decode a saved-state ConfigMap.
pub(crate) async fn get(
    kube_client: Client,
    namespace: &str,
    record_name: &str,
) -> Result<Option<SavedState>, Error> {
    let config_maps: Api<ConfigMap> = Api::namespaced(kube_client, namespace);
    match config_maps.get_opt(record_name).await.context(KubeSnafu)? {
        Some(config_map) => Ok(Some(SavedState::from_config_map(&config_map)?)),
        None => Ok(None),
    }
}

/// Persist a saved-state ConfigMap, never replacing an existing one.
pub(crate) async fn create(
    kube_client: Client,
    namespace: &str,
    state: &SavedState,
) -> Result<Created, Error> {
    let config_map = state.to_config_map(Utc::now())?;
    let config_maps: Api<ConfigMap> = Api::namespaced(kube_client, namespace);
    match config_maps
        .create(&PostParams::default(), &config_map)
        .await
    {
        Ok(_) => Ok(Created::Created),
        Err(err) if is_conflict(&err) => Ok(Created::AlreadyExists),
        Err(err) => Err(err).context(KubeSnafu),
    }
}

/// Overwrite the contents of an existing saved-state ConfigMap.
pub(crate) async fn update(
    kube_client: Client,
    namespace: &str,
    state: &SavedState,
) -> Result<(), Error> {
    let config_map = state.to_config_map(Utc::now())?;
    let config_maps: Api<ConfigMap> = Api::namespaced(kube_client, namespace);
    config_maps
        .patch(
            &state.record_name(),
            &PatchParams::default(),
            &Patch::Merge(&config_map),
        )
        .await
        .context(KubeSnafu)?;
    Ok(())
}

pub(crate) async fn delete(
    kube_client: Client,
    namespace: &str,
    record_name: &str,
) -> Result<(), Error> {
    let config_maps: Api<ConfigMap> = Api::namespaced(kube_client, namespace);
    match config_maps
        .delete(record_name, &DeleteParams::default())
        .await
    {
        Ok(_) => Ok(()),
        Err(err) if is_not_found(&err) => Ok(()),
        Err(err) => Err(err).context(KubeSnafu),
    }
}
