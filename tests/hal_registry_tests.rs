use anyhow::Result;
use async_trait::async_trait;
use retinosync::hal::mock::SimulatedCameraDriver;
use retinosync::hal::*;

struct OfflineDriver;

#[async_trait]
impl HardwareDriver for OfflineDriver {
    fn driver_id(&self) -> &str {
        "offline-driver"
    }

    async fn discover_devices(&self) -> Result<Vec<CameraInfo>> {
        anyhow::bail!("bus not reachable")
    }

    fn open_camera(&self, _device_id: &str, _config: CameraConfig) -> Result<Box<dyn CameraDevice>> {
        anyhow::bail!("bus not reachable")
    }
}

#[tokio::test]
async fn test_registry_register_and_list() {
    let mut registry = HardwareRegistry::new();

    // Initially empty
    assert_eq!(registry.list_drivers().len(), 0);

    registry.register(SimulatedCameraDriver::new());
    registry.register(OfflineDriver);
    assert_eq!(
        registry.list_drivers(),
        vec!["offline-driver".to_string(), "simulated-camera".to_string()]
    );
}

#[tokio::test]
async fn test_discover_skips_failing_driver() {
    let mut registry = HardwareRegistry::new();
    registry.register(SimulatedCameraDriver::new());
    registry.register(OfflineDriver);

    let cameras = registry.discover_all().await.unwrap();
    assert_eq!(cameras.len(), 2);
    assert!(cameras.iter().all(|c| c.driver_id == "simulated-camera"));
    assert!(cameras.iter().any(|c| c.has_hardware_clock));
    assert!(cameras.iter().any(|c| !c.has_hardware_clock));
}

#[tokio::test]
async fn test_open_camera_through_registry() {
    let mut registry = HardwareRegistry::new();
    registry.register(SimulatedCameraDriver::new());

    let camera = registry
        .open_camera("simulated-camera", "sim-cam-0", CameraConfig { fps: 30.0 })
        .unwrap();
    assert_eq!(camera.info().id, "sim-cam-0");
    assert!(camera.has_hardware_clock());

    assert!(registry
        .open_camera("simulated-camera", "no-such-camera", CameraConfig { fps: 30.0 })
        .is_err());
    assert!(registry
        .open_camera("missing-driver", "sim-cam-0", CameraConfig { fps: 30.0 })
        .is_err());
}
