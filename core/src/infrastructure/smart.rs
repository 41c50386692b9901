// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Parses `smartctl -a -j` JSON output into a device risk score used
//! by the health monitor's device scorer (spec §4.5).

use serde::Deserialize;

use crate::infrastructure::executor::{Executor, ExecutorError};

#[derive(Debug, thiserror::Error)]
pub enum SmartError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("failed to parse smartctl JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceRisk {
    Healthy,
    Watch,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct SmartReport {
    pub device: String,
    pub passed_overall_health: bool,
    pub reallocated_sector_count: Option<u64>,
    pub pending_sector_count: Option<u64>,
    pub uncorrectable_error_count: Option<u64>,
    pub temperature_celsius: Option<u64>,
    pub power_on_hours: Option<u64>,
}

impl SmartReport {
    /// Scores the device per spec §4.5's rule: any uncorrectable
    /// error or failed overall-health assessment is immediately
    /// critical; sector counts above the watch thresholds degrade
    /// gradually instead of flapping on a single bad read.
    pub fn risk(&self) -> DeviceRisk {
        if !self.passed_overall_health || self.uncorrectable_error_count.unwrap_or(0) > 0 {
            return DeviceRisk::Critical;
        }
        let reallocated = self.reallocated_sector_count.unwrap_or(0);
        let pending = self.pending_sector_count.unwrap_or(0);
        if reallocated > 50 || pending > 10 {
            DeviceRisk::Warning
        } else if reallocated > 0 || pending > 0 {
            DeviceRisk::Watch
        } else {
            DeviceRisk::Healthy
        }
    }
}

#[derive(Debug, Deserialize)]
struct SmartctlJson {
    smart_status: Option<SmartStatus>,
    ata_smart_attributes: Option<AtaSmartAttributes>,
    temperature: Option<Temperature>,
    power_on_time: Option<PowerOnTime>,
}

#[derive(Debug, Deserialize)]
struct SmartStatus {
    passed: bool,
}

#[derive(Debug, Deserialize)]
struct AtaSmartAttributes {
    table: Vec<AtaAttribute>,
}

#[derive(Debug, Deserialize)]
struct AtaAttribute {
    id: u32,
    raw: AtaRaw,
}

#[derive(Debug, Deserialize)]
struct AtaRaw {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Temperature {
    current: u64,
}

#[derive(Debug, Deserialize)]
struct PowerOnTime {
    hours: u64,
}

const ATTR_REALLOCATED_SECTOR_COUNT: u32 = 5;
const ATTR_CURRENT_PENDING_SECTOR: u32 = 197;
const ATTR_UNCORRECTABLE_SECTOR_COUNT: u32 = 198;

pub struct SmartCtl<'a> {
    executor: &'a Executor,
}

impl<'a> SmartCtl<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    pub async fn read(&self, device_by_id: &str) -> Result<SmartReport, SmartError> {
        let output = self.executor.run("smartctl", &["-a", "-j", device_by_id]).await?;
        let parsed: SmartctlJson = serde_json::from_slice(&output.stdout)?;

        let attr = |id: u32| -> Option<u64> {
            parsed.ata_smart_attributes.as_ref()?.table.iter().find(|a| a.id == id).map(|a| a.raw.value)
        };

        Ok(SmartReport {
            device: device_by_id.to_string(),
            passed_overall_health: parsed.smart_status.map(|s| s.passed).unwrap_or(true),
            reallocated_sector_count: attr(ATTR_REALLOCATED_SECTOR_COUNT),
            pending_sector_count: attr(ATTR_CURRENT_PENDING_SECTOR),
            uncorrectable_error_count: attr(ATTR_UNCORRECTABLE_SECTOR_COUNT),
            temperature_celsius: parsed.temperature.map(|t| t.current),
            power_on_hours: parsed.power_on_time.map(|p| p.hours),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(reallocated: u64, pending: u64, uncorrectable: u64, passed: bool) -> SmartReport {
        SmartReport {
            device: "/dev/disk/by-id/test".into(),
            passed_overall_health: passed,
            reallocated_sector_count: Some(reallocated),
            pending_sector_count: Some(pending),
            uncorrectable_error_count: Some(uncorrectable),
            temperature_celsius: Some(35),
            power_on_hours: Some(1000),
        }
    }

    #[test]
    fn failed_overall_health_is_always_critical() {
        assert_eq!(report(0, 0, 0, false).risk(), DeviceRisk::Critical);
    }

    #[test]
    fn any_uncorrectable_error_is_critical() {
        assert_eq!(report(0, 0, 1, true).risk(), DeviceRisk::Critical);
    }

    #[test]
    fn a_single_reallocated_sector_is_only_watch() {
        assert_eq!(report(1, 0, 0, true).risk(), DeviceRisk::Watch);
    }

    #[test]
    fn many_reallocated_sectors_is_warning() {
        assert_eq!(report(51, 0, 0, true).risk(), DeviceRisk::Warning);
    }

    #[test]
    fn clean_attributes_are_healthy() {
        assert_eq!(report(0, 0, 0, true).risk(), DeviceRisk::Healthy);
    }
}
