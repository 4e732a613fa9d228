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

use snafu::Snafu;
use std::num::ParseIntError;
use std::time::Duration;

/// Hibernator errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Neither in-cluster nor kubeconfig credentials were usable.
    #[snafu(display("kubernetes configuration error: {}", source))]
    KubeConfig {
        source: kube::config::InferConfigError,
    },

    /// Kubernetes API related errors.
    #[snafu(display("kubernetes error: {}", source))]
    Kube { source: kube::Error },

    /// JSON serialization errors.
    #[snafu(display("json serialization error: {}", source))]
    JsonSerialization { source: serde_json::Error },

    /// Kubernetes specification was missing a required field.
    #[snafu(display("kubernetes spec is missing fields"))]
    KubeSpec {},

    /// A saved-state record has no replica count.
    #[snafu(display("saved state {} has no replica count", key))]
    MissingReplicas { key: String },

    /// A saved-state record has a replica count that isn't an unsigned integer.
    #[snafu(display("saved state {} has an invalid replica count: {}", key, source))]
    SavedReplicas { key: String, source: ParseIntError },

    /// A saved-state record holds a scaled object that doesn't deserialize.
    #[snafu(display("saved state {} has an invalid scaled object: {}", key, source))]
    SavedScaledObject {
        key: String,
        source: serde_json::Error,
    },

    /// A live scaled object would be deleted without any saved copy of it.
    #[snafu(display(
        "scaled object {}/{} is not held by saved state {}, leaving it in place",
        namespace,
        name,
        record
    ))]
    UnsavedScaledObject {
        namespace: String,
        name: String,
        record: String,
    },

    /// A deleted scaled object was still visible when the settle timeout expired.
    #[snafu(display(
        "scaled object {}/{} still present after {:?}",
        namespace,
        name,
        timeout
    ))]
    SettleTimeout {
        namespace: String,
        name: String,
        timeout: Duration,
    },
}
