// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure plan computation: the actions that move current toward target.
//!
//! Ordering is three-phased: image pulls first (safe to run before
//! anything stops), then stops and removes in reverse dependency order,
//! then creates and starts in forward dependency order.

use fleetd_core::{AppSpec, ServiceSpec};
use std::collections::BTreeMap;

/// One container-level action dispatched to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanAction {
    PullImage {
        app_id: String,
        service_id: String,
        image: String,
    },
    CreateApp {
        app_id: String,
        app_name: String,
    },
    RemoveApp {
        app_id: String,
    },
    CreateService {
        app_id: String,
        service: ServiceSpec,
    },
    StartService {
        app_id: String,
        service_id: String,
    },
    StopService {
        app_id: String,
        service_id: String,
    },
    RemoveService {
        app_id: String,
        service_id: String,
    },
}

impl PlanAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PullImage { .. } => "pull_image",
            Self::CreateApp { .. } => "create_app",
            Self::RemoveApp { .. } => "remove_app",
            Self::CreateService { .. } => "create_service",
            Self::StartService { .. } => "start_service",
            Self::StopService { .. } => "stop_service",
            Self::RemoveService { .. } => "remove_service",
        }
    }

    /// The `(app, service)` this action belongs to, when service-scoped.
    pub fn service_ref(&self) -> Option<(&str, &str)> {
        match self {
            Self::PullImage {
                app_id, service_id, ..
            }
            | Self::CreateService {
                app_id,
                service: ServiceSpec { service_id, .. },
            }
            | Self::StartService { app_id, service_id }
            | Self::StopService { app_id, service_id }
            | Self::RemoveService { app_id, service_id } => Some((app_id, service_id)),
            Self::CreateApp { .. } | Self::RemoveApp { .. } => None,
        }
    }

    pub fn log_summary(&self) -> String {
        match self.service_ref() {
            Some((app, svc)) => format!("{} app={app} service={svc}", self.name()),
            None => match self {
                Self::CreateApp { app_id, .. } | Self::RemoveApp { app_id } => {
                    format!("{} app={app_id}", self.name())
                }
                _ => self.name().to_string(),
            },
        }
    }
}

/// An ordered action list. Empty when current already matches target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub actions: Vec<PlanAction>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

/// Services of an app in forward dependency order: dependencies before
/// dependents, declared (map) order among unrelated services. Cycles fall
/// back to declared order for the services involved.
fn ordered_services(app: &AppSpec) -> Vec<&ServiceSpec> {
    let by_name: BTreeMap<&str, &ServiceSpec> = app
        .services
        .values()
        .map(|s| (s.service_name.as_str(), s))
        .collect();

    let mut ordered: Vec<&ServiceSpec> = Vec::with_capacity(app.services.len());
    let mut placed: Vec<&str> = Vec::new();

    // Placement is keyed by service id (unique); names only resolve links.
    fn place<'a>(
        svc: &'a ServiceSpec,
        by_name: &BTreeMap<&str, &'a ServiceSpec>,
        placed: &mut Vec<&'a str>,
        visiting: &mut Vec<&'a str>,
        ordered: &mut Vec<&'a ServiceSpec>,
    ) {
        if placed.contains(&svc.service_id.as_str())
            || visiting.contains(&svc.service_id.as_str())
        {
            return;
        }
        visiting.push(&svc.service_id);
        for dep in &svc.config.depends_on {
            if let Some(dep_svc) = by_name.get(dep.as_str()) {
                place(dep_svc, by_name, placed, visiting, ordered);
            }
        }
        visiting.pop();
        placed.push(&svc.service_id);
        ordered.push(svc);
    }

    for svc in app.services.values() {
        let mut visiting = Vec::new();
        place(svc, &by_name, &mut placed, &mut visiting, &mut ordered);
    }
    ordered
}

/// Compute the plan that converges `current` onto `target`.
///
/// Applying the resulting plan and recomputing yields an empty plan;
/// equal states yield an empty plan immediately.
pub fn compute_plan(
    target: &BTreeMap<String, AppSpec>,
    current: &BTreeMap<String, AppSpec>,
) -> Plan {
    let mut pulls: Vec<PlanAction> = Vec::new();
    let mut teardown: Vec<PlanAction> = Vec::new();
    let mut bringup: Vec<PlanAction> = Vec::new();

    let mut app_ids: Vec<&String> = target.keys().chain(current.keys()).collect();
    app_ids.sort();
    app_ids.dedup();

    for app_id in app_ids {
        match (target.get(app_id), current.get(app_id)) {
            // New app: create it, then pull/create/start each service
            (Some(desired), None) => {
                bringup.push(PlanAction::CreateApp {
                    app_id: app_id.clone(),
                    app_name: desired.app_name.clone(),
                });
                for svc in ordered_services(desired) {
                    push_install(app_id, svc, &mut pulls, &mut bringup);
                }
            }

            // Removed app: stop and remove services in reverse order
            (None, Some(observed)) => {
                for svc in ordered_services(observed).into_iter().rev() {
                    push_teardown(app_id, svc, &mut teardown);
                }
                teardown.push(PlanAction::RemoveApp {
                    app_id: app_id.clone(),
                });
            }

            // Present in both: per-service diff
            (Some(desired), Some(observed)) => {
                // Removed services, reverse dependency order
                for svc in ordered_services(observed).into_iter().rev() {
                    if !desired.services.contains_key(&svc.service_id) {
                        push_teardown(app_id, svc, &mut teardown);
                    }
                }
                // New and changed services, forward dependency order
                for svc in ordered_services(desired) {
                    match observed.services.get(&svc.service_id) {
                        None => push_install(app_id, svc, &mut pulls, &mut bringup),
                        Some(running) => diff_service(
                            app_id,
                            svc,
                            running,
                            &mut pulls,
                            &mut teardown,
                            &mut bringup,
                        ),
                    }
                }
            }

            (None, None) => {}
        }
    }

    let mut actions = pulls;
    actions.extend(teardown);
    actions.extend(bringup);
    Plan { actions }
}

/// Plan for a service present on both sides.
fn diff_service(
    app_id: &str,
    desired: &ServiceSpec,
    observed: &ServiceSpec,
    pulls: &mut Vec<PlanAction>,
    teardown: &mut Vec<PlanAction>,
    bringup: &mut Vec<PlanAction>,
) {
    if desired.fingerprint() != observed.fingerprint() {
        // Recreate; pull first only when the image itself changed
        if desired.image_name != observed.image_name {
            pulls.push(PlanAction::PullImage {
                app_id: app_id.to_string(),
                service_id: desired.service_id.clone(),
                image: desired.image_name.clone(),
            });
        }
        push_teardown(app_id, observed, teardown);
        bringup.push(PlanAction::CreateService {
            app_id: app_id.to_string(),
            service: desired.without_runtime(),
        });
        bringup.push(PlanAction::StartService {
            app_id: app_id.to_string(),
            service_id: desired.service_id.clone(),
        });
    } else if !observed.is_running() {
        bringup.push(PlanAction::StartService {
            app_id: app_id.to_string(),
            service_id: desired.service_id.clone(),
        });
    }
}

fn push_install(
    app_id: &str,
    svc: &ServiceSpec,
    pulls: &mut Vec<PlanAction>,
    bringup: &mut Vec<PlanAction>,
) {
    pulls.push(PlanAction::PullImage {
        app_id: app_id.to_string(),
        service_id: svc.service_id.clone(),
        image: svc.image_name.clone(),
    });
    bringup.push(PlanAction::CreateService {
        app_id: app_id.to_string(),
        service: svc.without_runtime(),
    });
    bringup.push(PlanAction::StartService {
        app_id: app_id.to_string(),
        service_id: svc.service_id.clone(),
    });
}

fn push_teardown(app_id: &str, svc: &ServiceSpec, teardown: &mut Vec<PlanAction>) {
    teardown.push(PlanAction::StopService {
        app_id: app_id.to_string(),
        service_id: svc.service_id.clone(),
    });
    teardown.push(PlanAction::RemoveService {
        app_id: app_id.to_string(),
        service_id: svc.service_id.clone(),
    });
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
