//! ZCL cluster and profile identifiers used by the coordinator core

use crate::types::{ClusterId, EndpointId};

/// Home Automation application profile
pub const PROFILE_HOME_AUTOMATION: u16 = 0x0104;

/// Green Power proxy endpoint, skipped during discovery
pub const GREEN_POWER_ENDPOINT: EndpointId = 242;

pub const BASIC: ClusterId = 0x0000;
pub const GROUPS: ClusterId = 0x0004;
pub const SCENES: ClusterId = 0x0005;
pub const ON_OFF: ClusterId = 0x0006;
pub const LEVEL_CONTROL: ClusterId = 0x0008;
pub const OTA_UPGRADE: ClusterId = 0x0019;
pub const DOOR_LOCK: ClusterId = 0x0101;
pub const WINDOW_COVERING: ClusterId = 0x0102;
pub const THERMOSTAT: ClusterId = 0x0201;
pub const COLOR_CONTROL: ClusterId = 0x0300;
pub const TEMPERATURE_MEASUREMENT: ClusterId = 0x0402;
pub const PRESSURE_MEASUREMENT: ClusterId = 0x0403;
pub const REL_HUMIDITY_MEASUREMENT: ClusterId = 0x0405;
pub const OCCUPANCY_SENSING: ClusterId = 0x0406;
pub const IAS_ZONE: ClusterId = 0x0500;
pub const ELECTRICAL_MEASUREMENT: ClusterId = 0x0B04;
