mod http;
mod ws;

pub(crate) use http::LightwaveHttpController;
