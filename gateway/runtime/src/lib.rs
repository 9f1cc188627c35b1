#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod admin;
mod args;
mod duration;
mod gateway;
mod logpipe;

pub use self::{
    args::Args,
    duration::Interval,
    gateway::{Gateway, GatewayConfig},
    logpipe::LogPipe,
};
