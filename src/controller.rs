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
use crate::kubernetes::{Cluster, Created, Workload};
use crate::resource::strip_server_fields;
use crate::settle::poll_until;
use crate::state::{record_name, SavedState};
use slog::{debug, info, o, warn, Logger};
use snafu::ensure;
use std::collections::BTreeMap;
use std::time::Duration;

/// Label every suspendable workload carries by default.
pub const DEFAULT_MATCH_LABEL: (&str, &str) = ("environment", "non-production");

/// Scale controller tunables.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Workloads must carry every one of these labels to be selected.
    pub match_labels: BTreeMap<String, String>,
    /// How long to wait for a deleted scaled object to disappear.
    pub settle_timeout: Duration,
    /// How often to check whether a deleted scaled object is gone.
    pub settle_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        let mut match_labels = BTreeMap::new();
        match_labels.insert(
            DEFAULT_MATCH_LABEL.0.to_string(),
            DEFAULT_MATCH_LABEL.1.to_string(),
        );
        Self {
            match_labels,
            settle_timeout: Duration::from_secs(60),
            settle_interval: Duration::from_secs(1),
        }
    }
}

/// What happened to a single workload during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// State was saved and the workload scaled to zero.
    Suspended { replicas: u32, autoscaled: bool },
    /// A record from an earlier run was kept and the workload scaled to zero.
    /// The saved count is unknown when the record couldn't be read.
    AlreadySuspended { saved_replicas: Option<u32> },
    /// Saved state was reapplied and the record removed.
    Restored { replicas: u32, autoscaled: bool },
    /// Someone else recreated the scaled object, the record was dropped.
    AutoscalerConflict { replicas: u32 },
    /// There was no saved state, nothing was changed.
    NotSuspended,
}

/// Suspends and restores the workloads of a namespace.
pub struct ScaleController<C> {
    logger: Logger,
    cluster: C,
    settings: ControllerSettings,
}

impl<C: Cluster> ScaleController<C> {
    pub fn new(logger: Logger, cluster: C, settings: ControllerSettings) -> Self {
        Self {
            logger,
            cluster,
            settings,
        }
    }

    #[cfg(test)]
    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Save the scaling configuration of every selected workload and scale it to zero.
    pub async fn scale_down(&self, namespace: &str) -> Result<Vec<(String, Outcome)>, Error> {
        let workloads = self.select(namespace).await?;
        let mut outcomes = Vec::with_capacity(workloads.len());
        for workload in workloads {
            let outcome = self.suspend(&self.workload_logger(&workload), &workload).await?;
            outcomes.push((workload.name, outcome));
        }
        Ok(outcomes)
    }

    /// Reapply the saved scaling configuration of every selected workload.
    pub async fn scale_up(&self, namespace: &str) -> Result<Vec<(String, Outcome)>, Error> {
        let workloads = self.select(namespace).await?;
        let mut outcomes = Vec::with_capacity(workloads.len());
        for workload in workloads {
            let outcome = self.resume(&self.workload_logger(&workload), &workload).await?;
            outcomes.push((workload.name, outcome));
        }
        Ok(outcomes)
    }

    async fn select(&self, namespace: &str) -> Result<Vec<Workload>, Error> {
        let workloads = self
            .cluster
            .list_workloads(namespace, &self.settings.match_labels)
            .await?;
        info!(self.logger, "Selected workloads";
            "namespace" => namespace,
            "count" => workloads.len());
        Ok(workloads)
    }

    fn workload_logger(&self, workload: &Workload) -> Logger {
        self.logger.new(o!(
            "workload_namespace" => workload.namespace.clone(),
            "workload_name" => workload.name.clone(),
            "workload_kind" => workload.kind.to_string()))
    }

    /// Down transition for a single workload.
    async fn suspend(&self, logger: &Logger, workload: &Workload) -> Result<Outcome, Error> {
        let scaled_object = self
            .cluster
            .get_scaled_object(&workload.namespace, &workload.name)
            .await?;
        let autoscaled = scaled_object.is_some();

        let state = SavedState::new(&workload.name, workload.replicas, scaled_object);
        let outcome = match self
            .cluster
            .create_saved_state(&workload.namespace, &state)
            .await?
        {
            Created::Created => {
                info!(logger, "Saved workload state";
                    "record" => state.record_name(),
                    "replicas" => workload.replicas,
                    "autoscaled" => autoscaled);
                Outcome::Suspended {
                    replicas: workload.replicas,
                    autoscaled,
                }
            }
            Created::AlreadyExists => self.keep_saved_state(logger, workload, state).await?,
        };

        if autoscaled {
            self.cluster
                .delete_scaled_object(&workload.namespace, &workload.name)
                .await?;
            info!(logger, "Deleted scaled object");
            self.wait_for_scaled_object_removal(logger, workload).await?;
        } else {
            debug!(logger, "Workload has no scaled object");
        }

        self.cluster.scale_workload(workload, 0).await?;
        info!(logger, "Scaled workload"; "replicas" => 0);

        Ok(outcome)
    }

    /// Resolve a record left behind by an earlier run. Its replica count predates any zeroing and
    /// is never overwritten, but a live scaled object must be held by it before being deleted.
    async fn keep_saved_state(
        &self,
        logger: &Logger,
        workload: &Workload,
        state: SavedState,
    ) -> Result<Outcome, Error> {
        let record = state.record_name();
        let existing = match self
            .cluster
            .get_saved_state(&workload.namespace, &record)
            .await
        {
            Ok(existing) => existing,
            Err(err) => {
                warn!(logger, "Existing saved state is unreadable";
                    "record" => &record,
                    "error" => format!("{}", err));
                None
            }
        };

        let existing = match existing {
            Some(existing) => existing,
            None => {
                ensure!(
                    state.scaled_object.is_none(),
                    UnsavedScaledObjectSnafu {
                        namespace: &workload.namespace,
                        name: &workload.name,
                        record: &record,
                    }
                );
                warn!(logger, "Saved state already exists, skipping creation";
                    "record" => &record);
                return Ok(Outcome::AlreadySuspended {
                    saved_replicas: None,
                });
            }
        };

        if existing.replicas != workload.replicas {
            warn!(logger, "Keeping existing saved state that differs from the workload";
                "record" => &record,
                "saved_replicas" => existing.replicas,
                "current_replicas" => workload.replicas);
        } else {
            warn!(logger, "Saved state already exists, skipping creation";
                "record" => &record);
        }

        if existing.scaled_object.is_none() && state.scaled_object.is_some() {
            let merged = SavedState::new(&workload.name, existing.replicas, state.scaled_object);
            self.cluster
                .update_saved_state(&workload.namespace, &merged)
                .await?;
            warn!(logger, "Added live scaled object to existing saved state";
                "record" => &record);
        }

        Ok(Outcome::AlreadySuspended {
            saved_replicas: Some(existing.replicas),
        })
    }

    /// Poll until the api no longer returns the deleted scaled object.
    async fn wait_for_scaled_object_removal(
        &self,
        logger: &Logger,
        workload: &Workload,
    ) -> Result<(), Error> {
        let settled = poll_until(
            self.settings.settle_interval,
            self.settings.settle_timeout,
            move || async move {
                Ok::<_, Error>(
                    self.cluster
                        .get_scaled_object(&workload.namespace, &workload.name)
                        .await?
                        .is_none(),
                )
            },
        )
        .await?;

        ensure!(
            settled,
            SettleTimeoutSnafu {
                namespace: &workload.namespace,
                name: &workload.name,
                timeout: self.settings.settle_timeout,
            }
        );
        debug!(logger, "Scaled object removal has settled");
        Ok(())
    }

    /// Up transition for a single workload.
    async fn resume(&self, logger: &Logger, workload: &Workload) -> Result<Outcome, Error> {
        let record = record_name(&workload.name);
        let state = match self
            .cluster
            .get_saved_state(&workload.namespace, &record)
            .await?
        {
            Some(state) => state,
            None => {
                warn!(logger, "No saved state found for workload"; "record" => &record);
                return Ok(Outcome::NotSuspended);
            }
        };

        let replicas = state.desired_replicas();
        if replicas > 0 {
            self.cluster.scale_workload(workload, replicas).await?;
            info!(logger, "Scaled workload"; "replicas" => replicas);
        } else {
            debug!(logger, "Saved state restores zero replicas, leaving scale alone");
        }

        let autoscaled = state.scaled_object.is_some();
        if let Some(mut scaled_object) = state.scaled_object {
            strip_server_fields(&mut scaled_object);
            match self
                .cluster
                .create_scaled_object(&workload.namespace, &scaled_object)
                .await?
            {
                Created::Created => {
                    info!(logger, "Recreated scaled object");
                }
                Created::AlreadyExists => {
                    warn!(logger, "Scaled object already exists, discarding saved state";
                        "record" => &record);
                    self.cluster
                        .delete_saved_state(&workload.namespace, &record)
                        .await?;
                    return Ok(Outcome::AutoscalerConflict { replicas });
                }
            }
        }

        self.cluster
            .delete_saved_state(&workload.namespace, &record)
            .await?;
        info!(logger, "Deleted saved state"; "record" => &record);

        Ok(Outcome::Restored {
            replicas,
            autoscaled,
        })
    }
}
