use super::*;

impl<S: Syscall> CommsVat<S> {
    /// Wire slot `machine` should receive for `kernel_slot`, allocating and
    /// registering one on first use.
    pub fn map_outbound(&mut self, machine: &str, kernel_slot: Slot) -> Result<Slot, CommsError> {
        if !kernel_slot.is_kernel_facing() {
            return Err(CommsError::NotKernelSlot(kernel_slot));
        }
        if let Some(me_to_you) = self.state.clist.map_kernel_slot_for(machine, kernel_slot) {
            return Ok(me_to_you);
        }

        let scheme = self.config.pipelining;
        let kind = match (kernel_slot.kind, scheme) {
            (SlotKind::Export, _) => return Err(CommsError::UnregisteredExport(kernel_slot)),
            (SlotKind::Import, _) => SlotKind::YourIngress,
            (SlotKind::Promise, PipeliningScheme::Chained) => SlotKind::YourQuestion,
            (SlotKind::Promise, PipeliningScheme::Simplified) => SlotKind::YourPromise,
            (SlotKind::Resolver, PipeliningScheme::Chained) => SlotKind::YourAnswer,
            (SlotKind::Resolver, PipeliningScheme::Simplified) => SlotKind::YourResolver,
            _ => return Err(CommsError::NotKernelSlot(kernel_slot)),
        };
        let me_to_you = Slot::new(kind, self.state.ids.alloc());
        self.state.clist.add(
            machine,
            kernel_slot,
            change_perspective(me_to_you)?,
            me_to_you,
        )?;
        log::debug!("mapped {kernel_slot} to {me_to_you} for '{machine}'");

        match kernel_slot.kind {
            SlotKind::Promise => self.track_outbound_promise(machine, kernel_slot),
            SlotKind::Resolver => self.track_outbound_resolver(machine, kernel_slot),
            _ => {}
        }
        Ok(me_to_you)
    }

    pub fn map_outbound_slots(
        &mut self,
        machine: &str,
        kernel_slots: &[Slot],
    ) -> Result<Vec<Slot>, CommsError> {
        kernel_slots
            .iter()
            .map(|slot| self.map_outbound(machine, *slot))
            .collect()
    }

    /// Lookup-only variant for message targets and settled promises: the slot
    /// must already be registered for some machine.
    pub fn map_outbound_target(&self, kernel_slot: Slot) -> Result<(String, Slot), CommsError> {
        self.state
            .clist
            .map_kernel_slot(kernel_slot)
            .map(|(machine, me_to_you)| (machine.to_string(), me_to_you))
            .ok_or(CommsError::UnknownTarget(kernel_slot))
    }

    /// The kernel decides this promise; relay its settlement to `machine`.
    fn track_outbound_promise(&mut self, machine: &str, kernel_slot: Slot) {
        if let Some(record) = self.state.promises.get_mut(kernel_slot) {
            record.watch(machine);
            return;
        }
        let mut record = PromiseRecord::new(Decider::Kernel, machine);
        self.syscall.subscribe(kernel_slot.id);
        if self.config.pipelining.creates_relays() {
            let relay = self.syscall.create_promise();
            self.syscall.subscribe(relay.promise);
            record.relay = Some(relay);
        }
        self.state.promises.insert(kernel_slot, record);
    }

    /// `machine` decides this promise; its settlement comes back over the wire.
    fn track_outbound_resolver(&mut self, machine: &str, kernel_slot: Slot) {
        if let Some(record) = self.state.promises.get_mut(kernel_slot) {
            record.watch(machine);
            return;
        }
        let mut record = PromiseRecord::new(Decider::Remote(machine.to_string()), machine);
        if self.config.pipelining.creates_relays() {
            record.relay = Some(self.syscall.create_promise());
        }
        self.state.promises.insert(kernel_slot, record);
    }
}
