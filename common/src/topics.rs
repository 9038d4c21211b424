use crate::types::ZoneId;

pub const TOPIC_ZONE1_TEMP: &str = "dualzone/zone1/temperature";
pub const TOPIC_ZONE2_TEMP: &str = "dualzone/zone2/temperature";

pub const TOPIC_ZONE1_CMD_MODE: &str = "dualzone/zone1/cmnd/mode";
pub const TOPIC_ZONE2_CMD_MODE: &str = "dualzone/zone2/cmnd/mode";
pub const TOPIC_ZONE1_CMD_FAN: &str = "dualzone/zone1/cmnd/fan";
pub const TOPIC_ZONE2_CMD_FAN: &str = "dualzone/zone2/cmnd/fan";

pub const TOPIC_TELEMETRY: &str = "dualzone/controller/telemetry";

pub const TOPIC_CMD_ZONE1_TARGET: &str = "dualzone/cmnd/zone1/target";
pub const TOPIC_CMD_ZONE2_TARGET: &str = "dualzone/cmnd/zone2/target";
pub const TOPIC_CMD_ZONE1_FAN: &str = "dualzone/cmnd/zone1/fan";
pub const TOPIC_CMD_ZONE2_FAN: &str = "dualzone/cmnd/zone2/fan";
pub const TOPIC_CMD_ENABLED: &str = "dualzone/cmnd/enabled";
pub const TOPIC_CMD_RESET_LEARNING: &str = "dualzone/cmnd/learning/reset";

pub fn temperature_topic(zone: ZoneId) -> &'static str {
    match zone {
        ZoneId::Zone1 => TOPIC_ZONE1_TEMP,
        ZoneId::Zone2 => TOPIC_ZONE2_TEMP,
    }
}

pub fn mode_command_topic(zone: ZoneId) -> &'static str {
    match zone {
        ZoneId::Zone1 => TOPIC_ZONE1_CMD_MODE,
        ZoneId::Zone2 => TOPIC_ZONE2_CMD_MODE,
    }
}

pub fn fan_command_topic(zone: ZoneId) -> &'static str {
    match zone {
        ZoneId::Zone1 => TOPIC_ZONE1_CMD_FAN,
        ZoneId::Zone2 => TOPIC_ZONE2_CMD_FAN,
    }
}
