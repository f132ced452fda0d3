use indiwire_message::PropertyKind;

/// Errors raised by the device-side property model.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    /// A value of the wrong kind was assigned to an element.
    #[error("element {element} holds {expected} values, got {found}")]
    KindMismatch {
        element: String,
        expected: PropertyKind,
        found: PropertyKind,
    },

    /// Two siblings share a name.
    #[error("duplicate {what} name \"{name}\"")]
    DuplicateName { what: &'static str, name: String },

    /// A vector definition has no elements.
    #[error("vector {0} has no elements")]
    EmptyVector(String),

    #[error("unknown vector {0}")]
    UnknownVector(String),

    #[error("unknown element {element} in vector {vector}")]
    UnknownElement { vector: String, element: String },

    /// A client tried to write a read-only vector.
    #[error("vector {0} is read-only")]
    ReadOnly(String),

    /// Turning the last `On` switch of a OneOfMany vector `Off`.
    #[error("vector {vector} needs one switch On, refusing to turn {element} Off")]
    RuleViolation { vector: String, element: String },

    /// Wire text that does not parse for the element's format.
    #[error("invalid value \"{value}\" for element {element}")]
    InvalidValue { element: String, value: String },
}

pub type Result<T> = std::result::Result<T, PropertyError>;
