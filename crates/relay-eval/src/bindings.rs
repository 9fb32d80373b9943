//! Host seam: everything the evaluator cannot answer on its own.

use std::collections::HashMap;

/// Lookups resolved by the embedding host. Every method has a `None`
/// (or identity) default so the evaluator is testable without a host.
pub trait HostBindings {
    /// `${info:name}` / `${info:name,args}`.
    fn info(&self, _name: &str, _args: Option<&str>) -> Option<String> {
        None
    }

    /// `${modifier:name,data,string}`.
    fn modifier_exec(&self, _name: &str, _data: &str, _text: &str) -> Option<String> {
        None
    }

    /// `${sec.data.KEY}`.
    fn secured_data(&self, _key: &str) -> Option<String> {
        None
    }

    /// `${file.section.option}` config lookups.
    fn config_option(&self, _path: &str) -> Option<String> {
        None
    }

    /// `${translate:string}` i18n lookup.
    fn translate(&self, text: &str) -> String {
        text.to_owned()
    }

    /// Data-path traversal (`${buffer.full_name}`-style lookups); the
    /// pointer map names the roots the caller made visible.
    fn data_path(&self, _pointers: &HashMap<String, String>, _path: &str) -> Option<String> {
        None
    }
}

/// Binding used when no host is attached (plain text processing).
pub struct NoHost;

impl HostBindings for NoHost {}
