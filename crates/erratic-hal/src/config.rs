//! [`DriverConfig`] – the parameter block a driver is constructed from.
//!
//! Fields are `(section index, name, value)` triples, inserted by the process
//! shell and read by the driver.  Reads are tracked so that
//! [`DriverConfig::warn_unused`] can flag parameters the driver ignored.

use std::cell::Cell;

use tracing::warn;

#[derive(Debug)]
struct Field {
    index: usize,
    name: String,
    value: String,
    read: Cell<bool>,
}

#[derive(Debug, Default)]
pub struct DriverConfig {
    fields: Vec<Field>,
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.  Several values may share a name (e.g. `provides`);
    /// `index` orders them.
    pub fn insert(&mut self, index: usize, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(Field {
            index,
            name: name.into(),
            value: value.into(),
            read: Cell::new(false),
        });
    }

    /// The value of `name` at `index`, marking it as read.
    pub fn get(&self, name: &str, index: usize) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.index == index)
            .map(|f| {
                f.read.set(true);
                f.value.as_str()
            })
    }

    /// Every value of `name` ordered by index, marking them as read.
    pub fn values(&self, name: &str) -> Vec<&str> {
        let mut matching: Vec<&Field> = self.fields.iter().filter(|f| f.name == name).collect();
        matching.sort_by_key(|f| f.index);
        matching
            .into_iter()
            .map(|f| {
                f.read.set(true);
                f.value.as_str()
            })
            .collect()
    }

    /// Log every field nobody read and return their names.
    pub fn warn_unused(&self) -> Vec<String> {
        let unused: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !f.read.get())
            .map(|f| f.name.clone())
            .collect();
        for name in &unused {
            warn!(field = %name, "driver parameter was set but never read");
        }
        unused
    }
}
