//! Collection side of the daemon: polling the focus sampler and deciding which samples are worth
//! keeping.

pub mod collector;
pub mod ignore;
