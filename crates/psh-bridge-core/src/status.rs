//! Numeric status codes carried in response envelopes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status returned by every bridge operation.
///
/// Zero is success. Callers must not assume anything about a non-zero code
/// beyond "failure": runtime failures keep the code reported by the runtime,
/// host-side failures use the Windows error codes the request protocol
/// already understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub u32);

impl Status {
    pub const SUCCESS: Self = Self(0);
    pub const INVALID_HANDLE: Self = Self(6);
    pub const OUT_OF_MEMORY: Self = Self(14);
    pub const NOT_READY: Self = Self(21);
    pub const INVALID_PARAMETER: Self = Self(87);
    pub const BROKEN_PIPE: Self = Self(109);
    pub const ALREADY_EXISTS: Self = Self(183);
    pub const NOT_FOUND: Self = Self(1168);
    pub const INVALID_STATE: Self = Self(5023);

    pub const E_FAIL: Self = Self(0x8000_4005);
    pub const E_INVALIDARG: Self = Self(0x8007_0057);
    pub const DISP_E_MEMBERNOTFOUND: Self = Self(0x8002_0003);
    pub const DISP_E_TYPEMISMATCH: Self = Self(0x8002_0005);
    pub const DISP_E_EXCEPTION: Self = Self(0x8002_0009);
    pub const COR_E_BADIMAGEFORMAT: Self = Self(0x8007_000B);
    pub const COR_E_TYPELOAD: Self = Self(0x8013_1522);
    pub const CLR_E_SHIM_RUNTIME: Self = Self(0x8013_1700);

    /// Whether this status denotes success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Raw code as sent on the wire.
    #[must_use]
    pub const fn code(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

/// Errors that can be reported as a response status.
pub trait StatusCode {
    /// Status to place in the response envelope.
    fn status(&self) -> Status;
}

impl<T, E: StatusCode> StatusCode for Result<T, E> {
    fn status(&self) -> Status {
        match self {
            Ok(_) => Status::SUCCESS,
            Err(e) => e.status(),
        }
    }
}
