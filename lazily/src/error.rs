use facet::Facet;

/// Errors surfaced by registration calls and host DOM operations.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum Error {
    /// Please provide a valid handler function
    InvalidHandler,

    /// host rejected {operation} of `{attribute}`: {message}
    Host {
        operation: String,
        attribute: String,
        message: String,
    },

    /// cannot insert a node into its own subtree
    Hierarchy,
}

impl Error {
    /// Build a host error for a failed attribute operation.
    pub fn host(operation: &str, attribute: &str, message: impl Into<String>) -> Self {
        Error::Host {
            operation: operation.to_owned(),
            attribute: attribute.to_owned(),
            message: message.into(),
        }
    }
}
