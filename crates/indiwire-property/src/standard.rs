//! Vectors every INDI driver is expected to expose.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use indiwire_message::Permission;

use crate::definition::{ElementDef, VectorDef};

pub const CONNECTION: &str = "CONNECTION";
pub const CONNECT: &str = "CONNECT";
pub const DISCONNECT: &str = "DISCONNECT";
pub const DRIVER_INFO: &str = "DRIVER_INFO";

/// `CONNECTION` switch vector, disconnected by default.
pub fn connection() -> VectorDef {
    VectorDef::switch(CONNECTION)
        .label("Connection")
        .element(ElementDef::switch(CONNECT).label("Connect"))
        .element(ElementDef::switch(DISCONNECT).label("Disconnect"))
        .default_on(&[DISCONNECT])
}

/// Read-only `DRIVER_INFO` text vector.
pub fn driver_info(name: &str, exec: &str, version: &str, interface: DriverInterface) -> VectorDef {
    VectorDef::text(DRIVER_INFO)
        .label("Driver Info")
        .perm(Permission::ReadOnly)
        .element(ElementDef::text("DRIVER_NAME").label("Name").default_value(name))
        .element(ElementDef::text("DRIVER_EXEC").label("Exec").default_value(exec))
        .element(
            ElementDef::text("DRIVER_VERSION")
                .label("Version")
                .default_value(version),
        )
        .element(
            ElementDef::text("DRIVER_INTERFACE")
                .label("Interface")
                .default_value(interface.to_string()),
        )
}

/// Device classes advertised in `DRIVER_INFO.DRIVER_INTERFACE`, as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DriverInterface(u32);

impl DriverInterface {
    pub const GENERAL: Self = Self(0);
    pub const TELESCOPE: Self = Self(1 << 0);
    pub const CCD: Self = Self(1 << 1);
    pub const GUIDER: Self = Self(1 << 2);
    pub const FOCUSER: Self = Self(1 << 3);
    pub const FILTER: Self = Self(1 << 4);
    pub const DOME: Self = Self(1 << 5);
    pub const GPS: Self = Self(1 << 6);
    pub const WEATHER: Self = Self(1 << 7);
    pub const AO: Self = Self(1 << 8);
    pub const DUSTCAP: Self = Self(1 << 9);
    pub const LIGHTBOX: Self = Self(1 << 10);
    pub const DETECTOR: Self = Self(1 << 11);
    pub const ROTATOR: Self = Self(1 << 12);
    pub const SPECTROGRAPH: Self = Self(1 << 13);
    pub const CORRELATOR: Self = Self(1 << 14);
    pub const AUX: Self = Self(1 << 15);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DriverInterface {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DriverInterface {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for DriverInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
