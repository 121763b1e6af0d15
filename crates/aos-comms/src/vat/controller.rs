use super::*;
use crate::wire::decode_args;

/// Resolution payload for calls that return nothing.
pub const UNDEFINED_JSON: &str = r#"{"@qclass":"undefined"}"#;

const QCLASS: &str = "@qclass";

/// Bootstrap operations accepted on the controller root object (facet 0).
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerOp {
    Init {
        name: String,
        proof: Value,
        channel_device: Option<String>,
    },
    Connect {
        machine: String,
        verifying_key: Value,
        channel: String,
    },
    AddEgress {
        machine: String,
        index: u64,
        kernel_slot: Slot,
    },
    AddIngress {
        machine: String,
        index: u64,
    },
}

impl ControllerOp {
    pub fn parse(method: &str, args_json: &str, slots: &[Slot]) -> Result<Self, CommsError> {
        let read = || ArgReader::new(method, args_json, slots);
        match method {
            "init" => {
                let args = read()?;
                Ok(ControllerOp::Init {
                    name: args.string(0)?,
                    proof: args.value(1),
                    channel_device: args.optional_string(2)?,
                })
            }
            "connect" => {
                let args = read()?;
                Ok(ControllerOp::Connect {
                    machine: args.string(0)?,
                    verifying_key: args.value(1),
                    channel: args.string(2)?,
                })
            }
            "addEgress" => {
                let args = read()?;
                Ok(ControllerOp::AddEgress {
                    machine: args.string(0)?,
                    index: args.index(1)?,
                    kernel_slot: args.slot(2)?,
                })
            }
            "addIngress" => {
                let args = read()?;
                Ok(ControllerOp::AddIngress {
                    machine: args.string(0)?,
                    index: args.index(1)?,
                })
            }
            other => Err(CommsError::UnknownControllerMethod(other.to_string())),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            ControllerOp::Init { .. } => "init",
            ControllerOp::Connect { .. } => "connect",
            ControllerOp::AddEgress { .. } => "addEgress",
            ControllerOp::AddIngress { .. } => "addIngress",
        }
    }
}

struct ArgReader<'a> {
    method: &'a str,
    args: Vec<Value>,
    slots: &'a [Slot],
}

impl<'a> ArgReader<'a> {
    fn new(method: &'a str, args_json: &str, slots: &'a [Slot]) -> Result<Self, CommsError> {
        Ok(Self {
            method,
            args: decode_args(args_json)?,
            slots,
        })
    }

    fn error(&self, reason: String) -> CommsError {
        CommsError::ControllerArgs {
            method: self.method.to_string(),
            reason,
        }
    }

    fn value(&self, position: usize) -> Value {
        self.args.get(position).cloned().unwrap_or(Value::Null)
    }

    fn string(&self, position: usize) -> Result<String, CommsError> {
        match self.args.get(position) {
            Some(Value::String(s)) => Ok(s.clone()),
            other => Err(self.error(format!("argument {position} must be a string, got {other:?}"))),
        }
    }

    fn optional_string(&self, position: usize) -> Result<Option<String>, CommsError> {
        match self.args.get(position) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(value) if qclass(value) == Some("undefined") => Ok(None),
            Some(other) => Err(self.error(format!(
                "argument {position} must be a device name, got {other}"
            ))),
        }
    }

    fn index(&self, position: usize) -> Result<u64, CommsError> {
        self.args
            .get(position)
            .and_then(Value::as_u64)
            .ok_or_else(|| self.error(format!("argument {position} must be a wire index")))
    }

    /// Resolve a `{"@qclass":"slot","index":n}` argument against the delivery's slots.
    fn slot(&self, position: usize) -> Result<Slot, CommsError> {
        let value = self
            .args
            .get(position)
            .filter(|value| qclass(value) == Some("slot"))
            .ok_or_else(|| self.error(format!("argument {position} must be a slot reference")))?;
        let index = value
            .get("index")
            .and_then(Value::as_u64)
            .ok_or_else(|| self.error(format!("slot reference {position} lacks an index")))?;
        let slot = usize::try_from(index)
            .ok()
            .and_then(|index| self.slots.get(index))
            .copied()
            .ok_or_else(|| self.error(format!("slot index {index} out of range")))?;
        if !slot.is_kernel_facing() {
            return Err(CommsError::NotKernelSlot(slot));
        }
        Ok(slot)
    }
}

fn qclass(value: &Value) -> Option<&str> {
    value.get(QCLASS).and_then(Value::as_str)
}

impl<S: Syscall> CommsVat<S> {
    pub(super) fn handle_controller(
        &mut self,
        method: &str,
        args_json: &str,
        slots: &[Slot],
        resolver_id: Option<u64>,
    ) -> Result<(), CommsError> {
        let op = ControllerOp::parse(method, args_json, slots)?;
        self.apply_controller_op(op, resolver_id)
    }

    pub fn apply_controller_op(
        &mut self,
        op: ControllerOp,
        resolver_id: Option<u64>,
    ) -> Result<(), CommsError> {
        log::debug!("controller {}", op.method());
        match op {
            ControllerOp::Init {
                name,
                proof,
                channel_device,
            } => {
                if let Ok(existing) = self.state.machine.name() {
                    return Err(CommsError::AlreadyInitialized(existing.to_string()));
                }
                if let Some(device) = &channel_device {
                    if !self.devices.contains(device) {
                        return Err(CommsError::UnknownDevice(device.clone()));
                    }
                }
                self.state.machine.initialize(name.clone(), proof)?;
                if let Some(device) = channel_device {
                    self.devices
                        .get_mut(&device)?
                        .register_inbound_callback(&name)?;
                }
                let data = serde_json::to_string(&name)?;
                self.resolve_with_data(resolver_id, &data);
            }
            ControllerOp::Connect {
                machine,
                verifying_key,
                channel,
            } => {
                if self.config.verify_connect && !verify(&machine, &verifying_key) {
                    return Err(CommsError::VerificationFailed(machine));
                }
                self.state.channels.connect(machine, channel);
                self.resolve_with_data(resolver_id, UNDEFINED_JSON);
            }
            ControllerOp::AddEgress {
                machine,
                index,
                kernel_slot,
            } => {
                let you_to_me = Slot::new(SlotKind::YourEgress, index);
                self.state.clist.add(
                    &machine,
                    kernel_slot,
                    you_to_me,
                    change_perspective(you_to_me)?,
                )?;
                self.resolve_with_data(resolver_id, UNDEFINED_JSON);
            }
            ControllerOp::AddIngress { machine, index } => {
                let export = self.provide_ingress(&machine, index)?;
                if let Some(resolver) = resolver_id {
                    self.syscall.fulfill_to_target(resolver, export);
                }
            }
        }
        Ok(())
    }

    /// The local export standing for what `machine` egresses at `index`.
    fn provide_ingress(&mut self, machine: &str, index: u64) -> Result<Slot, CommsError> {
        let you_to_me = Slot::new(SlotKind::YourIngress, index);
        if let Some(existing) = self.state.clist.map_incoming(machine, you_to_me) {
            return Ok(existing);
        }
        let export = Slot::export(self.state.ids.alloc());
        self.state
            .clist
            .add(machine, export, you_to_me, change_perspective(you_to_me)?)?;
        Ok(export)
    }

    fn resolve_with_data(&mut self, resolver_id: Option<u64>, data: &str) {
        if let Some(resolver) = resolver_id {
            self.syscall.fulfill_to_data(resolver, data, &[]);
        }
    }
}

/// Verifying-key check for `connect`. Accepts every key; must be replaced
/// before peers are trusted on the strength of it.
fn verify(machine: &str, _verifying_key: &Value) -> bool {
    log::trace!("connect verification for '{machine}' is not enforced");
    true
}
