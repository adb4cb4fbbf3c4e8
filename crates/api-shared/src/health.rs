use crate::dto::HealthRes;

/// Liveness check shared by the REST server and the CLI.
///
/// This only reports that the process is up. Operational health (queue pressure, alerts) comes
/// from `StatisticsAggregator::system_health` in `triage-core`.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Triage service is alive".into(),
        }
    }
}
