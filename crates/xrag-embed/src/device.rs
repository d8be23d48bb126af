use candle_core::Device;
use tracing::info;

fn cpu_requested(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("cpu"))
}

/// Metal when built with the `metal` feature and a GPU is present, else CPU.
/// `APP_DEVICE=cpu` pins the CPU.
pub fn select_device() -> Device {
    let force_cpu = cpu_requested(std::env::var("APP_DEVICE").ok().as_deref());
    #[cfg(feature = "metal")]
    {
        if !force_cpu {
            match Device::new_metal(0) {
                Ok(dev) => {
                    info!(device = "metal", "Selected compute device");
                    return dev;
                }
                Err(e) => tracing::warn!("Metal unavailable, using CPU: {e}"),
            }
        }
    }
    info!(device = "cpu", forced = force_cpu, "Selected compute device");
    Device::Cpu
}
