//! Temperature sensors under `/sys/class/hwmon`

use crate::models::Temperatures;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Cpu,
    Gpu,
}

impl SensorKind {
    /// Classifies a hwmon driver by the content of its `name` file.
    pub fn from_driver(name: &str) -> Option<Self> {
        match name.trim() {
            "k10temp" | "cpu_thermal" | "coretemp" => Some(SensorKind::Cpu),
            "amdgpu" | "radeon" => Some(SensorKind::Gpu),
            _ => None,
        }
    }
}

/// Input files of the first CPU and GPU sensors found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HwmonSensors {
    pub cpu: Option<PathBuf>,
    pub gpu: Option<PathBuf>,
}

impl HwmonSensors {
    /// Scans `<sys_root>/class/hwmon`. A host without hwmon has no sensor.
    pub async fn discover(sys_root: &Path) -> Self {
        let dir = sys_root.join("class/hwmon");
        let mut sensors = Self::default();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %dir.display(), error = %e, "No hwmon class directory");
                return sensors;
            }
        };
        let mut devices = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            devices.push(entry.path());
        }
        devices.sort();

        for device in devices {
            let Ok(name) = fs::read_to_string(device.join("name")).await else {
                continue;
            };
            let input = device.join("temp1_input");
            match SensorKind::from_driver(&name) {
                Some(SensorKind::Cpu) if sensors.cpu.is_none() => sensors.cpu = Some(input),
                Some(SensorKind::Gpu) if sensors.gpu.is_none() => sensors.gpu = Some(input),
                _ => {}
            }
        }

        debug!(cpu = ?sensors.cpu, gpu = ?sensors.gpu, "Discovered hwmon sensors");
        sensors
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.gpu.is_none()
    }

    /// Current readings in millidegrees Celsius.
    pub async fn read(&self) -> Temperatures {
        Temperatures {
            cpu: read_input(self.cpu.as_deref()).await,
            gpu: read_input(self.gpu.as_deref()).await,
        }
    }
}

/// `None` for a missing sensor, `Some(0)` for one that cannot be read.
async fn read_input(path: Option<&Path>) -> Option<i64> {
    let path = path?;
    let value = match fs::read_to_string(path).await {
        Ok(text) => text.trim().parse().unwrap_or(0),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to read temperature input");
            0
        }
    };
    Some(value)
}
