use std::fmt;

/// Health of a job as seen by status reporting and the heartbeat branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    /// Not started yet.
    #[default]
    Idle,
    /// Running, no health verdict yet.
    Unknown,
    /// Last health check passed.
    Healthy,
    /// Last health check failed.
    Unhealthy,
    /// Maintenance mode; health events are ignored.
    Maintenance,
    /// Pinned healthy; never changes.
    AlwaysHealthy,
}

impl JobStatus {
    /// Boolean liveness view.
    pub fn is_healthy(&self) -> bool {
        matches!(self, JobStatus::Healthy | JobStatus::AlwaysHealthy)
    }

    /// Serialized name; idle and unknown both report "unknown".
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Healthy | JobStatus::AlwaysHealthy => "healthy",
            JobStatus::Unhealthy => "unhealthy",
            JobStatus::Maintenance => "maintenance",
            JobStatus::Idle | JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_names() {
        assert_eq!(JobStatus::Idle.to_string(), "unknown");
        assert_eq!(JobStatus::AlwaysHealthy.to_string(), "healthy");
        assert_eq!(JobStatus::Maintenance.to_string(), "maintenance");
        assert!(JobStatus::AlwaysHealthy.is_healthy());
        assert!(!JobStatus::Unknown.is_healthy());
    }
}
