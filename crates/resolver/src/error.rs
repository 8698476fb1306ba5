pub use modelswitch_common::{Error, Result};

modelswitch_common::impl_context!(Error);
