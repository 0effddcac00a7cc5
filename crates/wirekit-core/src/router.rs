//! Client-side target selection.
//!
//! A `Router` picks the `(ip, port)` a client channel connects to. Any
//! closure `Fn() -> Result<(String, u16)>` is a router.

use crate::error::Result;

pub trait Router {
    fn route(&self) -> Result<(String, u16)>;
}

impl<F> Router for F
where
    F: Fn() -> Result<(String, u16)>,
{
    fn route(&self) -> Result<(String, u16)> {
        self()
    }
}
