// relay-test-utils: raw-socket HTTP and WebSocket clients for
// integration tests. Deliberately minimal — just enough protocol to
// drive a server and assert on the bytes it returns.

pub mod http_client;
pub mod ws_client;

pub use http_client::{http_request, HttpResponse};
pub use ws_client::WsClient;
