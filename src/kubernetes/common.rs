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

use crate::resource::ANNOTATION_BASE;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const NOT_FOUND: u16 = 404;
const CONFLICT: u16 = 409;

/// Convert a matchLabels map into a list of labels for the kubernetes api.
pub(crate) fn build_label_selector(match_labels: &BTreeMap<String, String>) -> String {
    match_labels
        .iter()
        .fold(String::new(), |mut labels, (name, value)| {
            if !labels.is_empty() {
                labels.push(',');
            }
            labels.push_str(&format!("{}={}", name, value));
            labels
        })
}

/// Merge patch setting the replica count, stamped with the time of the change.
pub(crate) fn replicas_patch(replicas: u32, utc_now: DateTime<Utc>) -> Value {
    json!({
        "metadata": {
            "annotations": {
                format!("{}/last-scaled", ANNOTATION_BASE): utc_now.to_rfc3339()
            }
        },
        "spec": {
            "replicas": replicas
        }
    })
}

pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    has_status(err, NOT_FOUND)
}

pub(crate) fn is_conflict(err: &kube::Error) -> bool {
    has_status(err, CONFLICT)
}

fn has_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}
