//! definition of the general ethercat error type

use std::sync::Arc;
use core::fmt;

/**
    general object reporting an unexpected result regarding the cyclic exchange or its setup

    Its variant are meant to help finding the cause responsible for the problem and how to deal with it.

    [Self::Slave] variant should not be used without an appropriate type for `T`, `T` depend on the operation the slave reports for, and is usually an error code, or an enum.
*/
#[derive(Clone, Debug)]
pub enum EthercatError<T=()> {
    /// error caused by communication support
    ///
    /// these errors are exterior to this library
    Io(Arc<std::io::Error>),

    /// error reported by a slave or its device driver, its type depend on the operation returning this error
    Slave(T),

    /// error reported by the fieldbus master library, or misuse of a master
    ///
    /// these errors can generally be handled and fixed by using the master differently when the issue is in the user code
    Master(&'static str),

    /// error detected in the ethercat communication
    ///
    /// these errors can generally not be fixed and the whole communication has to be restarted
    Protocol(&'static str),

    /// error is due to too much time elapsed, but does not compromise the communication
    Timeout(&'static str),

    /// the configuration cannot be applied: capacity exceeded, inconsistent layout, missing element
    ///
    /// these errors abort the startup of the concerned master, there is no automatic retry
    Config(&'static str),
}

/// convenient alias to simplify return annotations
pub type EthercatResult<T=(), E=()> = core::result::Result<T, EthercatError<E>>;

impl<T: fmt::Debug> fmt::Display for EthercatError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(value) => write!(f, "io error: {}", value),
            Self::Slave(value) => write!(f, "slave error: {:?}", value),
            Self::Master(value) => write!(f, "master error: {}", value),
            Self::Protocol(value) => write!(f, "protocol error: {}", value),
            Self::Timeout(value) => write!(f, "timeout: {}", value),
            Self::Config(value) => write!(f, "configuration error: {}", value),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for EthercatError<T> {}

impl<T> From<std::io::Error> for EthercatError<T> {
    fn from(src: std::io::Error) -> Self {
        EthercatError::Io(Arc::new(src))
    }
}

impl<T> From<crate::data::PackingError> for EthercatError<T> {
    fn from(src: crate::data::PackingError) -> Self {
        EthercatError::Protocol(match src {
            crate::data::PackingError::BadSize(_, text) => text,
            crate::data::PackingError::InvalidValue(text) => text,
        })
    }
}

// because rust doesn't allow specialization and already implements `From<T> for T`, we cannot write smart conversions for generic EthercatError<T>, so these are manual conversion methods
impl<E> EthercatError<E> {
    /// convert the error if the slave specific error type allows it
    pub fn into<F>(self) -> EthercatError<F>
    where F: From<E> {
        self.map(|e| F::from(e))
    }
    /// convert the error with a callback handling the case of slave-specific error
    pub fn map<F,T>(self, callback: F) -> EthercatError<T>
    where F: Fn(E) -> T
    {
        match self {
            EthercatError::Slave(value) => EthercatError::Slave(callback(value)),
            EthercatError::Io(e) => EthercatError::Io(e),
            EthercatError::Master(message) => EthercatError::Master(message),
            EthercatError::Protocol(message) => EthercatError::Protocol(message),
            EthercatError::Timeout(message) => EthercatError::Timeout(message),
            EthercatError::Config(message) => EthercatError::Config(message),
        }
    }
    /// drop the slave-specific payload, keeping a message describing the failing operation
    pub fn erase(self, message: &'static str) -> EthercatError<()> {
        match self {
            EthercatError::Slave(_) => EthercatError::Master(message),
            other => other.map(|_| ()),
        }
    }
}
impl EthercatError<()> {
    /// convert an error with no slave-specific type into an error with any slave-specific type
    pub fn upgrade<F>(self) -> EthercatError<F> {
        match self {
            EthercatError::Slave(()) => EthercatError::Master("unspecified slave error"),
            EthercatError::Io(e) => EthercatError::Io(e),
            EthercatError::Master(message) => EthercatError::Master(message),
            EthercatError::Protocol(message) => EthercatError::Protocol(message),
            EthercatError::Timeout(message) => EthercatError::Timeout(message),
            EthercatError::Config(message) => EthercatError::Config(message),
        }
    }
}
