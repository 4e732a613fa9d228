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

use crate::controller::{ControllerSettings, Outcome, ScaleController};
use crate::error::*;
use crate::kubernetes::{KubernetesCluster, WorkloadKind};
use clap::{
    crate_authors, crate_description, crate_name, crate_version, error::ErrorKind, value_parser,
    Arg, ArgAction, ArgMatches, Command, ValueEnum,
};
use kube::{Client, Config};
use slog::{crit, error, info, o, Drain, Level, LevelFilter, Logger};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::panic;
use std::process::exit;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

/// Save/restore state machine.
mod controller;
/// Hibernator error types.
mod error;
/// Kubernetes api abstraction.
mod kubernetes;
/// KEDA ScaledObject types.
mod resource;
/// Polling helpers.
mod settle;
/// Saved-state records.
mod state;

/// Log level command line argument.
#[derive(Clone, Copy, PartialEq, Debug, ValueEnum)]
pub enum LogLevelArgument {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArgument> for Level {
    fn from(level_arg: LogLevelArgument) -> Level {
        match level_arg {
            LogLevelArgument::Critical => Level::Critical,
            LogLevelArgument::Error => Level::Error,
            LogLevelArgument::Warning => Level::Warning,
            LogLevelArgument::Info => Level::Info,
            LogLevelArgument::Debug => Level::Debug,
            LogLevelArgument::Trace => Level::Trace,
        }
    }
}

/// Direction of the transition to run.
#[derive(Clone, Copy, PartialEq, Debug, ValueEnum)]
pub enum CommandArgument {
    /// Save workload state and scale to zero.
    ScaleDown,
    /// Restore saved workload state.
    ScaleUp,
}

fn app() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .author(crate_authors!())
        .arg(
            Arg::new("COMMAND")
                .help("transition to apply to the selected workloads")
                .required(true)
                .value_parser(value_parser!(CommandArgument)),
        )
        .arg(
            Arg::new("NAMESPACE")
                .help("namespace containing the workloads")
                .env("HIBERNATOR_NAMESPACE")
                .default_value("development"),
        )
        .arg(
            Arg::new("MATCH_LABEL")
                .long("match-label")
                .help("only select workloads carrying this key=value label")
                .action(ArgAction::Append)
                .value_parser(parse_label)
                .default_value("environment=non-production"),
        )
        .arg(
            Arg::new("KIND")
                .long("kind")
                .help("workload kinds to select")
                .action(ArgAction::Append)
                .value_parser(value_parser!(WorkloadKind))
                .default_value("deployment"),
        )
        .arg(
            Arg::new("SETTLE_TIMEOUT")
                .long("settle-timeout")
                .help("seconds to wait for a deleted scaled object to disappear")
                .value_parser(value_parser!(u64))
                .default_value("60"),
        )
        .arg(
            Arg::new("SETTLE_INTERVAL")
                .long("settle-interval")
                .help("seconds between checks for a deleted scaled object")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("1"),
        )
        .arg(
            Arg::new("LOG_LEVEL")
                .long("log-level")
                .help("set the application log level")
                .ignore_case(true)
                .value_parser(value_parser!(LogLevelArgument))
                .default_value("info"),
        )
}

/// Parse a `key=value` label.
fn parse_label(label: &str) -> Result<(String, String), String> {
    match label.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.into(), value.into())),
        _ => Err(format!("expected key=value, got '{}'", label)),
    }
}

fn controller_settings(matches: &ArgMatches) -> ControllerSettings {
    let defaults = ControllerSettings::default();
    let match_labels: BTreeMap<String, String> = matches
        .get_many::<(String, String)>("MATCH_LABEL")
        .map(|labels| labels.cloned().collect())
        .unwrap_or(defaults.match_labels);
    ControllerSettings {
        match_labels,
        settle_timeout: matches
            .get_one::<u64>("SETTLE_TIMEOUT")
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(defaults.settle_timeout),
        settle_interval: matches
            .get_one::<u64>("SETTLE_INTERVAL")
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(defaults.settle_interval),
    }
}

fn workload_kinds(matches: &ArgMatches) -> Vec<WorkloadKind> {
    let mut kinds: Vec<WorkloadKind> = Vec::new();
    for kind in matches
        .get_many::<WorkloadKind>("KIND")
        .into_iter()
        .flatten()
    {
        if !kinds.contains(kind) {
            kinds.push(*kind);
        }
    }
    kinds
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let matches = app().get_matches();

    let log_level = matches
        .get_one::<LogLevelArgument>("LOG_LEVEL")
        .copied()
        .unwrap_or(LogLevelArgument::Info);
    let logger = Logger::root(
        StdMutex::new(LevelFilter::new(
            slog_json::Json::default(std::io::stdout()),
            log_level.into(),
        ))
        .map(slog::Fuse),
        o!("application" => crate_name!(), "version" => crate_version!()),
    );

    // Replace the panic handler with one that will exit the process on panics.
    // A CronJob will report the failed run.
    let panic_logger = logger.clone();
    let _ = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        crit!(panic_logger, "Thread panicked"; "error" => format!("{}", panic_info));
        exit(1);
    }));

    let command = match matches.get_one::<CommandArgument>("COMMAND") {
        Some(command) => *command,
        None => app()
            .error(ErrorKind::MissingRequiredArgument, "a command is required")
            .exit(),
    };
    let namespace = matches
        .get_one::<String>("NAMESPACE")
        .cloned()
        .unwrap_or_else(|| "development".into());
    let settings = controller_settings(&matches);
    let kinds = workload_kinds(&matches);

    // Credentials are loaded once, and the client shared by every call.
    let kube_config = if let Ok(kube_config) = Config::incluster() {
        kube_config
    } else {
        Config::infer().await.context(KubeConfigSnafu)?
    };
    let kube_client = Client::try_from(kube_config).context(KubeSnafu)?;

    let controller = ScaleController::new(
        logger.clone(),
        KubernetesCluster::new(kube_client, kinds),
        settings,
    );

    let result = match command {
        CommandArgument::ScaleDown => {
            info!(logger, "Scaling down workloads"; "namespace" => &namespace);
            controller.scale_down(&namespace).await
        }
        CommandArgument::ScaleUp => {
            info!(logger, "Scaling up workloads"; "namespace" => &namespace);
            controller.scale_up(&namespace).await
        }
    };

    match result {
        Ok(outcomes) => {
            for (workload_name, outcome) in &outcomes {
                info!(logger, "Workload transition complete";
                    "workload_name" => workload_name,
                    "outcome" => describe(outcome));
            }
            info!(logger, "Finished"; "workloads" => outcomes.len());
            Ok(())
        }
        Err(err) => {
            error!(logger, "Run aborted"; "error" => format!("{}", err));
            Err(err)
        }
    }
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Suspended {
            replicas,
            autoscaled,
        } => format!("suspended (saved {} replicas, autoscaled: {})", replicas, autoscaled),
        Outcome::AlreadySuspended {
            saved_replicas: Some(saved_replicas),
        } => format!(
            "suspended (kept earlier record of {} replicas)",
            saved_replicas
        ),
        Outcome::AlreadySuspended {
            saved_replicas: None,
        } => "suspended (kept unreadable earlier record)".into(),
        Outcome::Restored {
            replicas,
            autoscaled,
        } => format!("restored ({} replicas, autoscaled: {})", replicas, autoscaled),
        Outcome::AutoscalerConflict { replicas } => format!(
            "abandoned (scaled object already present, {} replicas)",
            replicas
        ),
        Outcome::NotSuspended => "skipped (no saved state)".into(),
    }
}
