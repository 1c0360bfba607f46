// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and fixtures shared by other crates' tests.

use crate::app::{AppSpec, ServiceConfig, ServiceSpec, ServiceStatus};
use crate::job::{JobDocument, JobExecutionData, JobStatus, JobStep, StepAction};
use crate::state::{CurrentState, TargetState};
use std::collections::BTreeMap;

/// A minimal service spec.
pub fn service(id: &str, name: &str, image: &str) -> ServiceSpec {
    ServiceSpec {
        service_id: id.into(),
        service_name: name.into(),
        image_name: image.into(),
        config: ServiceConfig::default(),
        container_id: None,
        status: None,
    }
}

/// A service observed as running, with a container id.
pub fn running_service(id: &str, name: &str, image: &str) -> ServiceSpec {
    let mut svc = service(id, name, image);
    svc.container_id = Some(format!("ctr-{id}"));
    svc.status = Some(ServiceStatus::Running);
    svc
}

/// An app holding the given services, keyed by service id.
pub fn app(id: &str, name: &str, services: Vec<ServiceSpec>) -> AppSpec {
    let mut spec = AppSpec::new(id, name);
    for svc in services {
        spec.services.insert(svc.service_id.clone(), svc);
    }
    spec
}

/// A target state holding the given apps.
pub fn target(version: u64, apps: Vec<AppSpec>) -> TargetState {
    TargetState {
        apps: keyed(apps),
        config: Default::default(),
        version,
        needs_deployment: false,
    }
}

/// A current state holding the given apps.
pub fn current(version: u64, apps: Vec<AppSpec>) -> CurrentState {
    CurrentState {
        apps: keyed(apps),
        config: Default::default(),
        version,
    }
}

fn keyed(apps: Vec<AppSpec>) -> BTreeMap<String, AppSpec> {
    apps.into_iter().map(|a| (a.app_id.clone(), a)).collect()
}

/// A single-step job invoking the given handler.
pub fn job(id: &str, handler: &str) -> JobExecutionData {
    JobExecutionData {
        job_id: id.into(),
        device_uuid: String::new(),
        job_document: JobDocument {
            version: "1.0".into(),
            steps: vec![JobStep {
                action: StepAction {
                    kind: handler.into(),
                    input: serde_json::Value::Null,
                },
            }],
        },
        status: JobStatus::Queued,
        version_number: 1,
        execution_number: 1,
        timeout_seconds: None,
        created_at: None,
    }
}
