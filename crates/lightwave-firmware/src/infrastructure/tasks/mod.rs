pub(crate) mod http_server;
pub(crate) mod network;
pub(crate) mod render;
pub(crate) mod restart;

pub(crate) use http_server::{HTTP_WORKERS, http_server_task};
pub(crate) use network::{network_runner_task, wifi_connection_task};
pub(crate) use render::render_task;
pub(crate) use restart::restart_task;
