use super::traits::{CameraDevice, HardwareDriver};
use super::types::{CameraConfig, CameraInfo};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of camera drivers
pub struct HardwareRegistry {
    drivers: HashMap<String, Arc<dyn HardwareDriver>>,
}

impl HardwareRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    pub fn register(&mut self, driver: impl HardwareDriver + 'static) {
        self.drivers
            .insert(driver.driver_id().to_string(), Arc::new(driver));
    }

    pub fn list_drivers(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.drivers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Discover cameras from every driver. A failing driver is logged and
    /// skipped.
    pub async fn discover_all(&self) -> Result<Vec<CameraInfo>> {
        let mut devices = Vec::new();
        for id in self.list_drivers() {
            let Some(driver) = self.drivers.get(&id) else {
                continue;
            };
            match driver.discover_devices().await {
                Ok(found) => devices.extend(found),
                Err(e) => log::warn!("discovery failed for driver {}: {}", id, e),
            }
        }
        Ok(devices)
    }

    pub fn open_camera(
        &self,
        driver_id: &str,
        device_id: &str,
        config: CameraConfig,
    ) -> Result<Box<dyn CameraDevice>> {
        self.drivers
            .get(driver_id)
            .ok_or_else(|| anyhow!("Unknown driver: {}", driver_id))?
            .open_camera(device_id, config)
    }
}

impl Default for HardwareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::SimulatedCameraDriver;

    #[tokio::test]
    async fn test_discover_and_open() {
        let mut registry = HardwareRegistry::new();
        registry.register(SimulatedCameraDriver::new());

        let devices = registry.discover_all().await.unwrap();
        assert!(!devices.is_empty());
        assert!(devices.iter().all(|d| d.driver_id == "simulated-camera"));

        let camera = registry
            .open_camera("simulated-camera", &devices[0].id, CameraConfig { fps: 30.0 })
            .unwrap();
        assert_eq!(camera.info().id, devices[0].id);
    }

    #[test]
    fn test_unknown_driver() {
        let registry = HardwareRegistry::new();
        assert!(registry
            .open_camera("nope", "cam0", CameraConfig { fps: 30.0 })
            .is_err());
    }
}
