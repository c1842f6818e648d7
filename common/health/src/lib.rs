use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Health reporting for the long-running loops of a service.
///
/// Each loop registers itself with a deadline and must report healthy more
/// often than that deadline, otherwise the probe fails. The process status is
/// the combination of all registered components: one stalled or unhealthy
/// component fails the whole check.

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Set on registration, before the first report comes in
    Starting,
    /// Recently reported healthy, must report again before the date
    HealthyUntil(DateTime<Utc>),
    /// Reported unhealthy
    Unhealthy,
    /// The HealthyUntil deadline was missed
    Stalled,
}

#[derive(Default, Debug)]
pub struct HealthStatus {
    /// True if every registered component is within its deadline
    pub healthy: bool,
    /// Per-component status, for display in the probe body
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

/// Handed to a component so it can report its own status.
#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Arc<Mutex<HashMap<String, ComponentStatus>>>,
}

impl HealthHandle {
    /// Report healthy until the component's deadline. Must be called more
    /// frequently than the deadline to keep the probe green.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(Utc::now() + self.deadline));
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.lock() {
            Ok(mut map) => {
                map.insert(self.component.clone(), status);
            }
            // Poisoned mutex: the probes will fail and the process restart
            Err(_) => warn!("poisoned HealthRegistry mutex"),
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Arc<Mutex<HashMap<String, ComponentStatus>>>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Registers a component and returns the handle it should report through.
    pub fn register(&self, component: &str, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.to_owned(),
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Computes the process status from all registered components.
    /// Can be used as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let Ok(components) = self.components.lock() else {
            warn!("poisoned HealthRegistry mutex");
            return HealthStatus::default();
        };

        let now = Utc::now();
        let mut result = HealthStatus {
            // Unhealthy until at least one component has registered
            healthy: !components.is_empty(),
            components: Default::default(),
        };

        for (name, status) in components.iter() {
            match status {
                ComponentStatus::HealthyUntil(until) if *until > now => {
                    result.components.insert(name.clone(), status.clone());
                }
                ComponentStatus::HealthyUntil(_) => {
                    result.healthy = false;
                    result
                        .components
                        .insert(name.clone(), ComponentStatus::Stalled);
                }
                _ => {
                    result.healthy = false;
                    result.components.insert(name.clone(), status.clone());
                }
            }
        }

        if !result.healthy {
            warn!("{} health check failed: {:?}", self.name, result.components);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_unhealthy() {
        let registry = HealthRegistry::new("liveness");
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn starting_component_is_not_healthy() {
        let registry = HealthRegistry::new("liveness");
        let _handle = registry.register("poller", Duration::seconds(30));

        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("poller"),
            Some(&ComponentStatus::Starting)
        );
    }

    #[test]
    fn healthy_after_report_within_deadline() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("poller", Duration::seconds(30));

        handle.report_healthy();
        assert!(registry.get_status().healthy);

        handle.report_status(ComponentStatus::Unhealthy);
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn missed_deadline_marks_component_stalled() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("poller", Duration::seconds(30));

        handle.report_status(ComponentStatus::HealthyUntil(
            Utc::now() - Duration::seconds(1),
        ));
        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("poller"),
            Some(&ComponentStatus::Stalled)
        );
    }

    #[test]
    fn all_components_must_be_healthy() {
        let registry = HealthRegistry::new("liveness");
        let poller = registry.register("poller", Duration::seconds(30));
        let server = registry.register("server", Duration::seconds(30));

        poller.report_healthy();
        assert!(!registry.get_status().healthy);

        server.report_healthy();
        assert!(registry.get_status().healthy);
    }

    #[test]
    fn into_response() {
        let nok = HealthStatus::default().into_response();
        assert_eq!(nok.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let ok = HealthStatus {
            healthy: true,
            components: Default::default(),
        }
        .into_response();
        assert_eq!(ok.status(), StatusCode::OK);
    }
}
