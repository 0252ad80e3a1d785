use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Define a unified error type for this crate.
#[expect(missing_docs, reason = "The variants are self-explanatory.")]
#[derive(Debug, Display, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // `#[error(not(source))]` below tells `derive_more` that `embassy_executor::SpawnError` does
    // not implement Rust's `core::error::Error` trait.
    #[cfg(feature = "arm")]
    #[display("{_0:?}")]
    TaskSpawn(#[error(not(source))] embassy_executor::SpawnError),

    #[display("settings storage is unavailable")]
    StorageUnavailable,

    #[display("stored settings failed validation")]
    StorageCorrupted,

    #[display("device name must be 1-63 characters, alphanumeric or '-'")]
    InvalidDeviceName,

    #[display("malformed dotted-quad address")]
    InvalidAddress,

    #[display("SSID or password exceeds the supported length")]
    CredentialsTooLong,

    #[display("radio driver rejected the request")]
    Radio,

    #[cfg(all(feature = "wifi", any(feature = "pico1", feature = "pico2")))]
    #[display("Flash operation failed: {_0:?}")]
    Flash(#[error(not(source))] embassy_rp::flash::Error),

    #[display("Format error")]
    FormatError,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Self::FormatError
    }
}

#[cfg(feature = "arm")]
impl From<embassy_executor::SpawnError> for Error {
    fn from(err: embassy_executor::SpawnError) -> Self {
        Self::TaskSpawn(err)
    }
}

#[cfg(all(feature = "wifi", any(feature = "pico1", feature = "pico2")))]
impl From<embassy_rp::flash::Error> for Error {
    fn from(err: embassy_rp::flash::Error) -> Self {
        Self::Flash(err)
    }
}
