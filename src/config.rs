use std::time::Duration;

/// Configuration surface consumed by the orchestration core.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of concurrently running scan processes.
    pub workers: usize,

    /// Hard wall-clock deadline for one scan execution.
    pub job_timeout: Duration,

    /// How long finished jobs stay readable before eviction.
    pub retention: Duration,

    /// How often the retention sweeper runs.
    pub retention_sweep_interval: Duration,

    /// How long in-flight scans may keep running after shutdown is requested.
    pub shutdown_grace: Duration,

    /// How long to wait for a killed scan process to actually exit.
    pub kill_grace: Duration,

    /// Path to the nmap executable.
    pub nmap_path: String,

    /// Address the HTTP API binds to.
    pub bind: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            job_timeout: Duration::from_secs(300),
            retention: Duration::from_secs(3600),
            retention_sweep_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(10),
            kill_grace: Duration::from_secs(5),
            nmap_path: "nmap".to_string(),
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}
