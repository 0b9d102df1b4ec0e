pub const TOPIC_SENSOR_TEMP: &str = "climate/sensor/temperature";
pub const TOPIC_SENSOR_HUMIDITY: &str = "climate/sensor/humidity";
pub const TOPIC_SENSOR_LIGHT: &str = "climate/sensor/light";
pub const TOPIC_SENSOR_STATUS: &str = "climate/sensor/status";

pub const TOPIC_CONTROLLER_STATE: &str = "climate/controller/state";

pub const TOPIC_CMD_ACTIVE: &str = "climate/cmnd/system/active";
pub const TOPIC_CMD_THRESHOLDS: &str = "climate/cmnd/thresholds";
