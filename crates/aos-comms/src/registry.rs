use std::collections::BTreeMap;

/// Machine name ↔ channel device name, populated by `connect`.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    by_machine: BTreeMap<String, String>,
}

impl ChannelRegistry {
    /// Record the device that reaches `machine`. A later call for the same
    /// machine replaces the earlier device.
    pub fn connect(&mut self, machine: impl Into<String>, device: impl Into<String>) {
        self.by_machine.insert(machine.into(), device.into());
    }

    pub fn device_for(&self, machine: &str) -> Option<&str> {
        self.by_machine.get(machine).map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_machine
            .iter()
            .map(|(machine, device)| (machine.as_str(), device.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_machine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_machine.is_empty()
    }
}
