//! Macros for replication error handling.

/// Creates a [`crate::error::RepError`] from error kind and description.
///
/// Accepts an optional third argument that is converted to a string and attached as detail.
#[macro_export]
macro_rules! rep_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::RepError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::RepError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::RepError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::rep_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::rep_error!($kind, $desc, $detail))
    };
}
