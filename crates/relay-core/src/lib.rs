// relay-core: the in-process host the relay exposes — buffers, lines,
// nicklists, hotlist, completion, signals, info/modifier registries,
// secured data, proxy records and configuration.

pub mod buffer;
pub mod completion;
pub mod config;
pub mod host;
pub mod hotlist;
pub mod intern;
pub mod proxy;
pub mod signals;

pub use buffer::{Buffer, Line};
pub use config::{Config, ConfigError};
pub use host::Host;
pub use hotlist::HotlistSort;
pub use proxy::{Proxy, ProxyKind};
pub use signals::{Signal, SignalData};
