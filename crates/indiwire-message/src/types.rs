//! Enumerated attribute values and their exact wire spellings.

use std::fmt;
use std::str::FromStr;

/// Protocol version announced in `getProperties`.
pub const PROTOCOL_VERSION: &str = "1.7";

/// A wire token that does not belong to the expected enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value \"{value}\"")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Exact wire spelling.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Property state, also used as the value of a light element.
    State, "state" {
        Idle => "Idle",
        Ok => "Ok",
        Busy => "Busy",
        Alert => "Alert",
    }
}

wire_enum! {
    /// Client access rights for a property vector.
    Permission, "perm" {
        ReadOnly => "ro",
        WriteOnly => "wo",
        ReadWrite => "rw",
    }
}

wire_enum! {
    /// Constraint over the switches of one switch vector.
    SwitchRule, "rule" {
        OneOfMany => "OneOfMany",
        AtMostOne => "AtMostOne",
        AnyOfMany => "AnyOfMany",
    }
}

wire_enum! {
    /// Value of a switch element.
    SwitchState, "switch" {
        On => "On",
        Off => "Off",
    }
}

wire_enum! {
    /// Per-client BLOB delivery policy.
    BlobEnable, "BLOB policy" {
        Never => "Never",
        Also => "Also",
        Only => "Only",
    }
}

wire_enum! {
    /// The five property kinds. The wire spelling is the infix used in tag
    /// names such as `defNumberVector` or `oneBLOB`.
    PropertyKind, "property kind" {
        Number => "Number",
        Text => "Text",
        Switch => "Switch",
        Light => "Light",
        Blob => "BLOB",
    }
}

impl Default for State {
    fn default() -> Self {
        State::Ok
    }
}

impl Default for Permission {
    fn default() -> Self {
        Permission::ReadWrite
    }
}

impl Default for SwitchRule {
    fn default() -> Self {
        SwitchRule::OneOfMany
    }
}

impl Default for SwitchState {
    fn default() -> Self {
        SwitchState::Off
    }
}

impl Default for BlobEnable {
    fn default() -> Self {
        BlobEnable::Never
    }
}

impl Permission {
    /// True when clients may send `new*Vector` for this property.
    pub fn is_writable(self) -> bool {
        self != Permission::ReadOnly
    }

    /// True when the device reports values to clients.
    pub fn is_readable(self) -> bool {
        self != Permission::WriteOnly
    }
}

impl SwitchState {
    pub fn is_on(self) -> bool {
        self == SwitchState::On
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

impl PropertyKind {
    /// Whether clients may send `new*Vector` messages of this kind.
    pub fn is_client_writable(self) -> bool {
        self != PropertyKind::Light
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_spellings_roundtrip() {
        for state in State::ALL {
            assert_eq!(state.as_str().parse::<State>().expect("state parses"), *state);
        }
        assert_eq!("ro".parse::<Permission>(), Ok(Permission::ReadOnly));
        assert_eq!("AtMostOne".parse::<SwitchRule>(), Ok(SwitchRule::AtMostOne));
        assert_eq!(PropertyKind::Blob.as_str(), "BLOB");
    }

    #[test]
    fn spellings_are_case_sensitive() {
        let err = "ok".parse::<State>().unwrap_err();
        assert_eq!(err.kind, "state");
        assert_eq!(err.value, "ok");
        assert!("on".parse::<SwitchState>().is_err());
    }

    #[test]
    fn defaults() {
        assert_eq!(State::default(), State::Ok);
        assert_eq!(Permission::default(), Permission::ReadWrite);
        assert_eq!(BlobEnable::default(), BlobEnable::Never);
        assert_eq!(SwitchState::default(), SwitchState::Off);
    }
}
