pub(crate) use alloc::borrow::ToOwned;
pub(crate) use alloc::format;
pub(crate) use alloc::string::{String, ToString};
pub(crate) use alloc::sync::Arc;
pub(crate) use alloc::vec;
pub(crate) use alloc::vec::Vec;
pub(crate) use core::any::Any;
pub(crate) use core::fmt::Debug;
pub(crate) use log::{debug, error, info, trace, warn};

pub(crate) use crate::error::{ErrCode, Ext2Error, Result};

pub type PBlockId = u64;
pub type LBlockId = u32;
pub type InodeId = u32;
pub type BlockGroupId = u32;
