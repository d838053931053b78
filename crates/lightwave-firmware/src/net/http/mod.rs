pub(crate) mod connection;
pub(crate) mod headers;
pub(crate) mod server;

pub(crate) use connection::HttpConnection;
pub(crate) use headers::{ContentType, HttpMethod, ResponseHeaders};
pub(crate) use server::{HttpHandler, HttpServer};

#[derive(Debug)]
pub enum Error {
    Closed,
    Parse,
    /// Request body larger than the receive buffer.
    TooLarge,
    FormatHeaders,
}

impl From<core::fmt::Error> for Error {
    fn from(_error: core::fmt::Error) -> Self {
        Error::FormatHeaders
    }
}

impl From<embassy_net::tcp::Error> for Error {
    fn from(err: embassy_net::tcp::Error) -> Self {
        match err {
            embassy_net::tcp::Error::ConnectionReset => Error::Closed,
        }
    }
}

pub(crate) type HttpResult = Result<(), Error>;
