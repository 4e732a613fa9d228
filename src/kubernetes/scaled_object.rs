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
use crate::resource::{scaled_object_api_resource, ScaledObject};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use snafu::ResultExt;

fn api(kube_client: Client, namespace: &str) -> Api<ScaledObject> {
    Api::namespaced_with(kube_client, namespace, &scaled_object_api_resource())
}

/// Retrieve a KEDA ScaledObject by name.
pub(crate) async fn get(
    kube_client: Client,
    namespace: &str,
    name: &str,
) -> Result<Option<ScaledObject>, Error> {
    api(kube_client, namespace)
        .get_opt(name)
        .await
        .context(KubeSnafu)
}

/// Delete a KEDA ScaledObject, which hands replica control back to us.
pub(crate) async fn delete(kube_client: Client, namespace: &str, name: &str) -> Result<(), Error> {
    match api(kube_client, namespace)
        .delete(name, &DeleteParams::default())
        .await
    {
        Ok(_) => Ok(()),
        Err(err) if is_not_found(&err) => Ok(()),
        Err(err) => Err(err).context(KubeSnafu),
    }
}

/// Create a KEDA ScaledObject. The caller strips server populated fields first.
pub(crate) async fn create(
    kube_client: Client,
    namespace: &str,
    scaled_object: &ScaledObject,
) -> Result<Created, Error> {
    match api(kube_client, namespace)
        .create(&PostParams::default(), scaled_object)
        .await
    {
        Ok(_) => Ok(Created::Created),
        Err(err) if is_conflict(&err) => Ok(Created::AlreadyExists),
        Err(err) => Err(err).context(KubeSnafu),
    }
}
