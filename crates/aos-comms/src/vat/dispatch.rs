use super::*;
use crate::ids::CONTROLLER_FACET;
use crate::wire::decode_args;

/// Peers a settlement reached, and the first delivery failure if any.
pub(super) struct Announcement {
    delivered: Vec<String>,
    failure: Option<CommsError>,
}

impl<S: Syscall> CommsVat<S> {
    /// Kernel delivery of `method` to one of this vat's objects. Facet 0 is the
    /// controller; every other facet is a presence of a remote object.
    pub fn deliver(
        &mut self,
        facet_id: u64,
        method: &str,
        args_json: &str,
        kernel_slots: &[Slot],
        resolver_id: Option<u64>,
    ) -> Result<(), CommsError> {
        if facet_id == CONTROLLER_FACET {
            return self.handle_controller(method, args_json, kernel_slots, resolver_id);
        }

        let (machine, target) = self.map_outbound_target(Slot::export(facet_id))?;
        let args = decode_args(args_json)?;
        let slots = self.map_outbound_slots(&machine, kernel_slots)?;
        let result_slot = resolver_id
            .map(|resolver| self.map_outbound(&machine, Slot::resolver(resolver)))
            .transpose()?;
        let call = WireCall {
            target,
            method_name: method.to_string(),
            args,
            slots,
            result_slot,
        };
        self.transmit(&machine, &call.into())?;
        self.hand_off_settled(&machine, kernel_slots)
    }

    pub fn notify_fulfill_to_data(
        &mut self,
        promise_id: u64,
        data_json: &str,
        kernel_slots: &[Slot],
    ) -> Result<(), CommsError> {
        self.relay_from_kernel(
            promise_id,
            Resolution::Data {
                data: data_json.to_string(),
                slots: kernel_slots.to_vec(),
            },
        )
    }

    pub fn notify_fulfill_to_target(
        &mut self,
        promise_id: u64,
        target: Slot,
    ) -> Result<(), CommsError> {
        self.relay_from_kernel(promise_id, Resolution::Target { target })
    }

    pub fn notify_reject(
        &mut self,
        promise_id: u64,
        data_json: &str,
        kernel_slots: &[Slot],
    ) -> Result<(), CommsError> {
        serde_json::from_str::<Value>(data_json)?;
        self.relay_from_kernel(
            promise_id,
            Resolution::Rejection {
                data: data_json.to_string(),
                slots: kernel_slots.to_vec(),
            },
        )
    }

    fn relay_from_kernel(
        &mut self,
        promise_id: u64,
        resolution: Resolution,
    ) -> Result<(), CommsError> {
        let kernel_slot = Slot::promise(promise_id);
        if let Some(owner) = self.state.promises.relay_owner(promise_id) {
            log::debug!("relay promise {promise_id} for {owner} settled");
            return Ok(());
        }

        let (home, _) = self.map_outbound_target(kernel_slot)?;
        let mut peers = vec![home];
        let mut resolvers = Vec::new();
        if let Some(record) = self.state.promises.get(kernel_slot) {
            if let Decider::Remote(machine) = &record.decider {
                log::debug!("{kernel_slot} is decided by '{machine}', kernel echo ignored");
                return Ok(());
            }
            if record.is_settled() {
                return Err(CommsError::AlreadySettled(kernel_slot));
            }
            resolvers.extend(record.relay.map(|relay| relay.resolver));
            peers.extend(record.watchers.iter().cloned());
        }
        peers.extend(self.state.subscribers.get(promise_id).iter().cloned());
        let mut seen = BTreeSet::new();
        peers.retain(|peer| seen.insert(peer.clone()));

        let announcement = self.announce_resolution(kernel_slot, &peers, &resolution)?;
        self.commit_resolution(kernel_slot, resolution, &resolvers, &[], announcement)
    }

    /// Send a settlement of `kernel_slot` to every listed peer that knows it.
    /// Every event is built before the first one is sent, and a failed send
    /// does not stop the remaining peers.
    pub(super) fn announce_resolution(
        &mut self,
        kernel_slot: Slot,
        peers: &[String],
        resolution: &Resolution,
    ) -> Result<Announcement, CommsError> {
        let mut outgoing = Vec::with_capacity(peers.len());
        for peer in peers {
            let Some(promise) = self.state.clist.map_kernel_slot_for(peer, kernel_slot) else {
                log::warn!("'{peer}' subscribed to {kernel_slot} without a clist entry");
                continue;
            };
            let event = self.resolution_to_wire(peer, promise, resolution)?;
            outgoing.push(self.prepare(peer, &event.into())?);
        }

        let mut announcement = Announcement {
            delivered: Vec::new(),
            failure: None,
        };
        for message in &outgoing {
            match self.send(message) {
                Ok(()) => announcement.delivered.push(message.to.clone()),
                Err(err) => {
                    log::warn!("settlement of {kernel_slot} did not reach '{}': {err}", message.to);
                    announcement.failure.get_or_insert(err);
                }
            }
        }
        Ok(announcement)
    }

    /// Record a settlement and settle `resolvers`, unless every peer that had
    /// to hear about it was unreachable. `informed` already knows the outcome.
    pub(super) fn commit_resolution(
        &mut self,
        kernel_slot: Slot,
        resolution: Resolution,
        resolvers: &[u64],
        informed: &[String],
        announcement: Announcement,
    ) -> Result<(), CommsError> {
        let Announcement { delivered, failure } = announcement;
        if delivered.is_empty() {
            if let Some(err) = failure {
                return Err(err);
            }
        }

        if let Some(record) = self.state.promises.get_mut(kernel_slot) {
            record.settle(resolution.clone());
            for machine in informed.iter().chain(&delivered) {
                record.mark_notified(machine);
            }
        }
        for resolver in resolvers {
            self.settle_kernel_resolver(*resolver, &resolution);
        }
        let carried = resolution.kernel_slots();
        for peer in &delivered {
            self.hand_off_settled(peer, &carried)?;
        }
        failure.map_or(Ok(()), Err)
    }

    /// `machine` was just sent `kernel_slots`; tell it how any of those
    /// promises already settled, since no notify will arrive for them again.
    pub(super) fn hand_off_settled(
        &mut self,
        machine: &str,
        kernel_slots: &[Slot],
    ) -> Result<(), CommsError> {
        for &kernel_slot in kernel_slots {
            if kernel_slot.kind != SlotKind::Promise {
                continue;
            }
            let Some(record) = self.state.promises.get(kernel_slot) else {
                continue;
            };
            if record.was_notified(machine) {
                continue;
            }
            let Some(resolution) = record.resolution.clone() else {
                continue;
            };
            let Some(promise) = self.state.clist.map_kernel_slot_for(machine, kernel_slot) else {
                continue;
            };

            let event = self.resolution_to_wire(machine, promise, &resolution)?;
            log::debug!("{kernel_slot} settled earlier, telling '{machine}'");
            self.transmit(machine, &event.into())?;
            if let Some(record) = self.state.promises.get_mut(kernel_slot) {
                record.mark_notified(machine);
            }
            self.hand_off_settled(machine, &resolution.kernel_slots())?;
        }
        Ok(())
    }

    fn resolution_to_wire(
        &mut self,
        machine: &str,
        promise: Slot,
        resolution: &Resolution,
    ) -> Result<WireEvent, CommsError> {
        Ok(match resolution {
            Resolution::Data { data, slots } => WireEvent::NotifyFulfillToData {
                promise,
                args: data.clone(),
                slots: self.map_outbound_slots(machine, slots)?,
            },
            Resolution::Target { target } => WireEvent::NotifyFulfillToTarget {
                promise,
                target: self.map_outbound(machine, *target)?,
            },
            Resolution::Rejection { data, slots } => WireEvent::NotifyReject {
                promise,
                args: serde_json::from_str::<Value>(data)?,
                slots: self.map_outbound_slots(machine, slots)?,
            },
        })
    }

    pub(super) fn settle_kernel_resolver(&mut self, resolver: u64, resolution: &Resolution) {
        match resolution {
            Resolution::Data { data, slots } => self.syscall.fulfill_to_data(resolver, data, slots),
            Resolution::Target { target } => self.syscall.fulfill_to_target(resolver, *target),
            Resolution::Rejection { data, slots } => self.syscall.reject(resolver, data, slots),
        }
    }
}
