//! Tool invokers available to handlers through `HandlerContext::tools`.

mod local;

pub use local::LocalToolbox;
