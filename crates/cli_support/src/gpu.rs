use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct GpuStatus {
    pub available: bool,
    pub vendor: Option<String>,
    pub device_name: Option<String>,
    pub mem_total_mb: Option<u64>,
}

impl GpuStatus {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            vendor: None,
            device_name: None,
            mem_total_mb: None,
        }
    }

    /// `name (vendor, N MB)`, omitting fields that were not reported.
    pub fn describe(&self) -> String {
        let name = self.device_name.as_deref().unwrap_or("unknown");
        let details: Vec<String> = self
            .vendor
            .clone()
            .into_iter()
            .chain(self.mem_total_mb.map(|mb| format!("{mb} MB")))
            .collect();
        if details.is_empty() {
            name.to_string()
        } else {
            format!("{name} ({})", details.join(", "))
        }
    }
}

pub trait GpuProbe {
    fn status(&self) -> GpuStatus;
}

/// Queries `nvidia-smi`; reports unavailable when the tool is missing or fails.
pub struct NvidiaSmiProbe;

pub struct FallbackGpuProbe;

impl GpuProbe for NvidiaSmiProbe {
    fn status(&self) -> GpuStatus {
        nvidia_smi_status().unwrap_or_else(GpuStatus::unavailable)
    }
}

impl GpuProbe for FallbackGpuProbe {
    fn status(&self) -> GpuStatus {
        GpuStatus::unavailable()
    }
}

pub fn platform_probe() -> Box<dyn GpuProbe> {
    #[cfg(any(target_os = "linux", target_os = "windows"))]
    {
        Box::new(NvidiaSmiProbe)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Box::new(FallbackGpuProbe)
    }
}

fn nvidia_smi_status() -> Option<GpuStatus> {
    use std::process::Command;

    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,memory.total",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
}

fn parse_nvidia_smi(text: &str) -> Option<GpuStatus> {
    let mut parts = text.lines().next()?.split(',');
    let name = parts.next()?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    let mem_total_mb = parts.next().and_then(|v| v.trim().parse::<u64>().ok());
    Some(GpuStatus {
        available: true,
        vendor: Some("NVIDIA".to_string()),
        device_name: Some(name),
        mem_total_mb,
    })
}

/// Probe once and log the outcome. A missing GPU is a warning, never an error.
pub fn log_gpu_status(probe: &dyn GpuProbe) -> GpuStatus {
    let status = probe.status();
    if status.available {
        tracing::info!("Default GPU Device: {}", status.describe());
    } else {
        tracing::warn!("No GPU found. Please use a GPU to train your neural network.");
    }
    status
}
