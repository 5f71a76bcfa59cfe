use crate::prelude::*;

/// Ext2Error number.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrCode {
    ENOENT = 2,    /* No such file or directory */
    EIO = 5,       /* I/O error */
    ENOMEM = 12,   /* Out of memory */
    ENOTDIR = 20,  /* Not a directory */
    EISDIR = 21,   /* Is a directory */
    EINVAL = 22,   /* Invalid argument; malformed on-disk structure */
    EFBIG = 27,    /* File too large */
    ENOSPC = 28,   /* No space left on device */
    EROFS = 30,    /* Read-only file system */
    ENODATA = 61,  /* No data available; unmapped logical block */
    ENOTSUP = 95,  /* Not supported */
    EUCLEAN = 117, /* Structure needs cleaning */
}

/// error used in this crate
pub struct Ext2Error {
    code: ErrCode,
    message: Option<String>,
}

pub type Result<T> = core::result::Result<T, Ext2Error>;

impl Debug for Ext2Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(message) = &self.message {
            write!(
                f,
                "Ext2Error {{ code: {:?}, message: {:?} }}",
                self.code, message
            )
        } else {
            write!(f, "Ext2Error {{ code: {:?} }}", self.code)
        }
    }
}

impl core::fmt::Display for Ext2Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{:?}: {}", self.code, message),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl core::error::Error for Ext2Error {}

impl Ext2Error {
    pub const fn new(code: ErrCode) -> Self {
        Ext2Error {
            code,
            message: None,
        }
    }

    pub const fn with_message(code: ErrCode, message: String) -> Self {
        Ext2Error {
            code,
            message: Some(message),
        }
    }

    pub fn with_msg_str(code: ErrCode, message: &str) -> Self {
        Self::with_message(code, message.to_owned())
    }

    pub const fn code(&self) -> ErrCode {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[macro_export]
macro_rules! format_error {
    ($code: expr, $message: expr) => {
        $crate::Ext2Error::with_message($code, ::alloc::format!($message))
    };
    ($code: expr, $fmt: expr,  $($args:tt)*) => {
        $crate::Ext2Error::with_message($code, ::alloc::format!($fmt, $($args)*))
    };
}

#[macro_export]
macro_rules! return_error {
    ($code: expr, $message: expr) => {
        return Err($crate::format_error!($code, $message))
    };
    ($code: expr, $fmt: expr,  $($args:tt)*) => {
        return Err($crate::format_error!($code, $fmt, $($args)*))
    }
}
