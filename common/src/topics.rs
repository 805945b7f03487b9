pub const TOPIC_DEVICE_STATUS: &str = "iot/device/status";
pub const TOPIC_DEVICE_CONTROL: &str = "iot/device/control";
