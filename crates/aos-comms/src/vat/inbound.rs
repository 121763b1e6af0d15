use super::*;
use crate::wire::{LegacyCall, LegacyMessage, encode_args};

const LEGACY_EXPORT: &str = "export";

impl<S: Syscall> CommsVat<S> {
    /// Device callback for wire traffic from `sender`.
    pub fn receive(&mut self, sender: &str, message: &str) -> Result<(), CommsError> {
        self.verify_sender(sender)?;
        match WireMessage::decode(message)? {
            WireMessage::Call(call) => self.call_from_remote(sender, call),
            WireMessage::Event(event) => self.settle_from_remote(sender, event),
        }
    }

    /// Legacy device callback: `{index, methodName, args, slots, resultIndex?}`
    /// addressed by egress index, or a settlement event.
    pub fn send_in(&mut self, sender: &str, payload: &str) -> Result<(), CommsError> {
        if !self.config.legacy_send_in {
            return Err(CommsError::LegacyDisabled);
        }
        self.verify_sender(sender)?;
        match LegacyMessage::decode(payload)? {
            LegacyMessage::Event(event) => self.settle_from_remote(sender, event),
            LegacyMessage::Call(call) => self.legacy_call(sender, call),
        }
    }

    fn verify_sender(&self, sender: &str) -> Result<(), CommsError> {
        log::trace!("accepting traffic from '{sender}' without verification");
        Ok(())
    }

    fn legacy_call(&mut self, sender: &str, call: LegacyCall) -> Result<(), CommsError> {
        let target = self.legacy_lookup(sender, call.index)?;
        let slots = call
            .slots
            .iter()
            .map(|slot| {
                if slot.kind != LEGACY_EXPORT {
                    return Err(CommsError::UnsupportedLegacySlot(slot.kind.clone()));
                }
                self.legacy_lookup(sender, slot.index)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let args_json = encode_args(&call.args)?;
        let promise_id = self
            .syscall
            .send(target, &call.method_name, &args_json, &slots);
        if let Some(result_index) = call.result_index {
            self.register_result(
                sender,
                Slot::new(SlotKind::YourAnswer, result_index),
                promise_id,
            )?;
        }
        Ok(())
    }

    fn legacy_lookup(&self, sender: &str, index: u64) -> Result<Slot, CommsError> {
        let wire = Slot::new(SlotKind::YourEgress, index);
        self.state
            .clist
            .map_incoming(sender, wire)
            .ok_or(CommsError::UnknownTarget(wire))
    }

    fn call_from_remote(&mut self, sender: &str, call: WireCall) -> Result<(), CommsError> {
        let target = self
            .state
            .clist
            .map_incoming(sender, call.target)
            .ok_or(CommsError::UnknownTarget(call.target))?;
        if let Some(result_slot) = call.result_slot {
            if !result_slot.kind.is_answer() {
                return Err(CommsError::InvalidResultSlot(result_slot));
            }
        }
        match target.kind {
            SlotKind::Export => return self.forward_call(sender, target, call),
            SlotKind::Import | SlotKind::Promise => {}
            _ => return Err(CommsError::InvalidTarget(target)),
        }

        let slots = self.map_inbound_slots(sender, &call.slots)?;
        let args_json = encode_args(&call.args)?;
        let promise_id = self
            .syscall
            .send(target, &call.method_name, &args_json, &slots);
        log::debug!(
            "'{sender}' -> {target}.{}() queued as promise {promise_id}",
            call.method_name
        );
        if let Some(result_slot) = call.result_slot {
            self.register_result(sender, result_slot, promise_id)?;
        }
        Ok(())
    }

    /// `target` is an ingress from another machine: pass the call along,
    /// carrying the result through a fresh kernel promise.
    fn forward_call(
        &mut self,
        sender: &str,
        target: Slot,
        call: WireCall,
    ) -> Result<(), CommsError> {
        let home = self
            .state
            .clist
            .home_of(target)
            .ok_or(CommsError::UnknownTarget(target))?
            .to_string();
        let forward_target = self
            .state
            .clist
            .map_kernel_slot_for(&home, target)
            .ok_or(CommsError::UnknownTarget(target))?;

        let kernel_slots = self.map_inbound_slots(sender, &call.slots)?;
        let slots = self.map_outbound_slots(&home, &kernel_slots)?;
        let result_slot = match call.result_slot {
            Some(result_slot) => {
                let pair = self.syscall.create_promise();
                self.register_result(sender, result_slot, pair.promise)?;
                Some(self.map_outbound(&home, Slot::resolver(pair.resolver))?)
            }
            None => None,
        };
        log::debug!(
            "forwarding {}() from '{sender}' to '{home}'",
            call.method_name
        );
        let forwarded = WireCall {
            target: forward_target,
            method_name: call.method_name,
            args: call.args,
            slots,
            result_slot,
        };
        self.transmit(&home, &forwarded.into())?;
        self.hand_off_settled(&home, &kernel_slots)
    }

    /// Kernel slot for a wire slot `machine` sent us, minting ingresses and
    /// remote-decided promises on first sight.
    pub fn map_inbound(&mut self, machine: &str, wire: Slot) -> Result<Slot, CommsError> {
        if wire.is_kernel_facing() {
            return Err(CommsError::NotWireSlot(wire));
        }
        if let Some(kernel_slot) = self.state.clist.map_incoming(machine, wire) {
            return self.kernel_stand_in(kernel_slot);
        }
        match wire.kind {
            SlotKind::YourIngress => {
                let export = Slot::export(self.state.ids.alloc());
                self.state
                    .clist
                    .add(machine, export, wire, change_perspective(wire)?)?;
                Ok(export)
            }
            kind if kind.is_question() => {
                let pair = self.syscall.create_promise();
                let kernel_slot = Slot::promise(pair.promise);
                self.state
                    .clist
                    .add(machine, kernel_slot, wire, change_perspective(wire)?)?;
                let mut record = PromiseRecord::new(Decider::Remote(machine.to_string()), machine);
                record.resolver = Some(pair.resolver);
                self.state.promises.insert(kernel_slot, record);
                Ok(kernel_slot)
            }
            _ => Err(CommsError::UnknownWireSlot {
                machine: machine.to_string(),
                slot: wire,
            }),
        }
    }

    pub fn map_inbound_slots(
        &mut self,
        machine: &str,
        wire_slots: &[Slot],
    ) -> Result<Vec<Slot>, CommsError> {
        wire_slots
            .iter()
            .map(|slot| self.map_inbound(machine, *slot))
            .collect()
    }

    /// Resolvers cannot be handed to the kernel as arguments; their relay
    /// promise stands in for them.
    fn kernel_stand_in(&self, kernel_slot: Slot) -> Result<Slot, CommsError> {
        if kernel_slot.kind != SlotKind::Resolver {
            return Ok(kernel_slot);
        }
        self.state
            .promises
            .get(kernel_slot)
            .and_then(|record| record.relay)
            .map(|relay| Slot::promise(relay.promise))
            .ok_or(CommsError::MissingRelay {
                kind: kernel_slot.kind,
                id: kernel_slot.id,
            })
    }

    fn settle_from_remote(&mut self, sender: &str, event: WireEvent) -> Result<(), CommsError> {
        let promise_wire = event.promise();
        let kernel_slot = self
            .state
            .clist
            .map_incoming(sender, promise_wire)
            .ok_or(CommsError::UnknownTarget(promise_wire))?;
        let record = self
            .state
            .promises
            .get(kernel_slot)
            .ok_or(CommsError::UnknownPromise(kernel_slot))?;
        if !record.decided_by(sender) {
            return Err(CommsError::NotDecider {
                machine: sender.to_string(),
                promise: kernel_slot,
            });
        }
        if record.is_settled() {
            return Err(CommsError::AlreadySettled(kernel_slot));
        }
        let resolvers = record.resolvers_for(kernel_slot);
        let onlookers: Vec<String> = record
            .watchers
            .iter()
            .filter(|watcher| watcher.as_str() != sender)
            .cloned()
            .collect();

        let resolution = match event {
            WireEvent::NotifyFulfillToData { args, slots, .. } => Resolution::Data {
                data: args,
                slots: self.map_inbound_slots(sender, &slots)?,
            },
            WireEvent::NotifyFulfillToTarget { target, .. } => {
                let target = self.map_inbound(sender, target)?;
                if target.kind == SlotKind::Promise {
                    return Err(CommsError::ResolveToPromise {
                        promise: kernel_slot,
                        target,
                    });
                }
                Resolution::Target { target }
            }
            WireEvent::NotifyReject { args, slots, .. } => Resolution::Rejection {
                data: serde_json::to_string(&args)?,
                slots: self.map_inbound_slots(sender, &slots)?,
            },
        };

        log::debug!("'{sender}' settled {kernel_slot} via {promise_wire}");
        let announcement = self.announce_resolution(kernel_slot, &onlookers, &resolution)?;
        self.commit_resolution(
            kernel_slot,
            resolution,
            &resolvers,
            &[sender.to_string()],
            announcement,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{Call, RecordingSyscall, connected_vat};
    use super::*;
    use serde_json::json;

    fn egress_to(vat: &mut CommsVat<RecordingSyscall>, machine: &str, index: u64, kernel: Slot) {
        vat.apply_controller_op(
            ControllerOp::AddEgress {
                machine: machine.into(),
                index,
                kernel_slot: kernel,
            },
            None,
        )
        .unwrap();
    }

    #[test]
    fn legacy_send_in_sends_and_subscribes() {
        let (mut vat, log, _outbox) = connected_vat("alice", &["sender"]);
        egress_to(&mut vat, "sender", 0, Slot::import(10));

        vat.send_in(
            "sender",
            r#"{"index":0,"methodName":"getBalance","args":[],"slots":[],"resultIndex":5}"#,
        )
        .unwrap();

        let calls = log.calls();
        let [Call::Send {
            target,
            method,
            args,
            slots,
            result,
        }, Call::Subscribe(subscribed)] = calls.as_slice()
        else {
            panic!("unexpected calls {calls:?}");
        };
        assert_eq!(*target, Slot::import(10));
        assert_eq!(method, "getBalance");
        assert_eq!(args, r#"{"args":[]}"#);
        assert!(slots.is_empty());
        assert_eq!(subscribed, result);
        assert_eq!(
            vat.state()
                .clist
                .map_incoming("sender", Slot::new(SlotKind::YourAnswer, 5)),
            Some(Slot::promise(*result))
        );
        assert_eq!(vat.state().subscribers.get(*result), ["sender".to_string()]);
    }

    #[test]
    fn legacy_send_in_rejects_non_export_slots() {
        let (mut vat, log, _outbox) = connected_vat("alice", &["sender"]);
        egress_to(&mut vat, "sender", 0, Slot::import(10));
        let err = vat
            .send_in(
                "sender",
                r#"{"index":0,"methodName":"m","args":[],"slots":[{"type":"promise","index":1}]}"#,
            )
            .unwrap_err();
        assert!(matches!(err, CommsError::UnsupportedLegacySlot(kind) if kind == "promise"));
        assert!(log.calls().is_empty());
    }

    #[test]
    fn legacy_send_in_to_unknown_index_fails() {
        let (mut vat, _log, _outbox) = connected_vat("alice", &["sender"]);
        let err = vat
            .send_in("sender", r#"{"index":3,"methodName":"m","args":[]}"#)
            .unwrap_err();
        assert!(matches!(err, CommsError::UnknownTarget(_)));
    }

    #[test]
    fn legacy_send_in_can_be_disabled() {
        let (mut vat, _log, _outbox) = connected_vat("alice", &["sender"]);
        vat.config.legacy_send_in = false;
        let err = vat
            .send_in("sender", r#"{"index":0,"methodName":"m","args":[]}"#)
            .unwrap_err();
        assert!(matches!(err, CommsError::LegacyDisabled));
    }

    #[test]
    fn receive_mints_ingresses_and_remote_promises() {
        let (mut vat, log, _outbox) = connected_vat("alice", &["bot"]);
        egress_to(&mut vat, "bot", 2, Slot::import(10));

        let message = json!({
            "target": { "type": "your-egress", "id": 2 },
            "methodName": "pay",
            "args": [],
            "slots": [
                { "type": "your-ingress", "id": 7 },
                { "type": "your-question", "id": 8 },
            ],
            "resultSlot": { "type": "your-answer", "id": 9 },
        });
        vat.receive("bot", &message.to_string()).unwrap();

        let calls = log.calls();
        let Call::CreatePromise(pair) = calls[0] else {
            panic!("expected promise creation, got {calls:?}");
        };
        let Call::Send { slots, result, .. } = &calls[1] else {
            panic!("expected send, got {calls:?}");
        };
        assert_eq!(slots, &vec![Slot::export(1), Slot::promise(pair.promise)]);
        assert_eq!(calls[2], Call::Subscribe(*result));

        let record = vat.state().promises.get(Slot::promise(pair.promise)).unwrap();
        assert!(record.decided_by("bot"));
        assert_eq!(record.resolver, Some(pair.resolver));
    }

    #[test]
    fn receive_rejects_unknown_targets_and_bad_results() {
        let (mut vat, _log, _outbox) = connected_vat("alice", &["bot"]);
        let unknown = json!({
            "target": { "type": "your-egress", "id": 2 },
            "methodName": "pay",
        });
        assert!(matches!(
            vat.receive("bot", &unknown.to_string()),
            Err(CommsError::UnknownTarget(_))
        ));

        egress_to(&mut vat, "bot", 2, Slot::import(10));
        let bad_result = json!({
            "target": { "type": "your-egress", "id": 2 },
            "methodName": "pay",
            "resultSlot": { "type": "your-question", "id": 3 },
        });
        assert!(matches!(
            vat.receive("bot", &bad_result.to_string()),
            Err(CommsError::InvalidResultSlot(_))
        ));

        let unknown_egress = json!({
            "target": { "type": "your-egress", "id": 2 },
            "methodName": "pay",
            "slots": [{ "type": "your-egress", "id": 40 }],
        });
        assert!(matches!(
            vat.receive("bot", &unknown_egress.to_string()),
            Err(CommsError::UnknownWireSlot { .. })
        ));
    }

    #[test]
    fn remote_settlement_reaches_the_kernel_resolver() {
        let (mut vat, log, _outbox) = connected_vat("alice", &["bot"]);
        vat.deliver(0, "addIngress", r#"{"args":["bot",8]}"#, &[], None)
            .unwrap();
        vat.deliver(1, "ask", r#"{"args":[]}"#, &[], Some(70)).unwrap();
        let relay = vat
            .state()
            .promises
            .get(Slot::resolver(70))
            .unwrap()
            .relay
            .unwrap();
        log.clear();

        let reply = json!({
            "event": "notifyFulfillToData",
            "promise": { "type": "your-question", "id": 2 },
            "args": "42",
            "slots": [],
        });
        vat.receive("bot", &reply.to_string()).unwrap();
        assert_eq!(
            log.calls(),
            vec![
                Call::FulfillToData {
                    resolver: 70,
                    data: "42".into(),
                    slots: vec![],
                },
                Call::FulfillToData {
                    resolver: relay.resolver,
                    data: "42".into(),
                    slots: vec![],
                },
            ]
        );

        let again = vat.receive("bot", &reply.to_string()).unwrap_err();
        assert!(matches!(again, CommsError::AlreadySettled(_)));
    }

    #[test]
    fn legacy_settlement_short_circuits_to_the_resolver() {
        let (mut vat, log, _outbox) = connected_vat("alice", &["sender"]);
        let answer = vat.map_outbound("sender", Slot::resolver(60)).unwrap();
        let relay = vat
            .state()
            .promises
            .get(Slot::resolver(60))
            .unwrap()
            .relay
            .unwrap();
        log.clear();

        let event = json!({
            "event": "notifyFulfillToData",
            "promise": change_perspective(answer).unwrap(),
            "args": "7",
            "slots": [],
        });
        vat.send_in("sender", &event.to_string()).unwrap();
        assert_eq!(
            log.calls(),
            vec![
                Call::FulfillToData {
                    resolver: 60,
                    data: "7".into(),
                    slots: vec![],
                },
                Call::FulfillToData {
                    resolver: relay.resolver,
                    data: "7".into(),
                    slots: vec![],
                },
            ]
        );
        assert!(vat.state().promises.get(Slot::resolver(60)).unwrap().is_settled());
    }

    #[test]
    fn unreachable_onlooker_defers_remote_settlement() {
        let (mut vat, log, outbox) = connected_vat("alice", &["bot", "user"]);
        vat.deliver(0, "addIngress", r#"{"args":["bot",8]}"#, &[], None)
            .unwrap();
        vat.deliver(1, "ask", r#"{"args":[]}"#, &[], Some(70)).unwrap();
        vat.map_outbound("user", Slot::resolver(70)).unwrap();
        outbox.take();
        log.clear();

        let reply = json!({
            "event": "notifyFulfillToData",
            "promise": { "type": "your-question", "id": 2 },
            "args": "42",
        })
        .to_string();
        outbox.cut("user");
        let err = vat.receive("bot", &reply).unwrap_err();
        assert!(matches!(err, CommsError::Device(_)));
        assert!(log.calls().is_empty());

        outbox.mend("user");
        vat.receive("bot", &reply).unwrap();
        assert!(log.calls().contains(&Call::FulfillToData {
            resolver: 70,
            data: "42".into(),
            slots: vec![],
        }));
        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user");
    }

    #[test]
    fn only_the_decider_may_settle() {
        let (mut vat, _log, _outbox) = connected_vat("alice", &["bot", "user"]);
        vat.deliver(0, "addIngress", r#"{"args":["bot",8]}"#, &[], None)
            .unwrap();
        vat.deliver(1, "give", r#"{"args":[]}"#, &[Slot::promise(50)], None)
            .unwrap();

        let forged = json!({
            "event": "notifyFulfillToData",
            "promise": { "type": "your-answer", "id": 2 },
            "args": "1",
        });
        let err = vat.receive("bot", &forged.to_string()).unwrap_err();
        assert!(matches!(err, CommsError::NotDecider { machine, .. } if machine == "bot"));
    }

    #[test]
    fn fulfilling_to_a_promise_is_refused() {
        let (mut vat, _log, _outbox) = connected_vat("alice", &["bot"]);
        vat.deliver(0, "addIngress", r#"{"args":["bot",8]}"#, &[], None)
            .unwrap();
        vat.deliver(1, "ask", r#"{"args":[]}"#, &[], Some(70)).unwrap();

        let reply = json!({
            "event": "notifyFulfillToTarget",
            "promise": { "type": "your-question", "id": 2 },
            "target": { "type": "your-question", "id": 30 },
        });
        let err = vat.receive("bot", &reply.to_string()).unwrap_err();
        assert!(matches!(err, CommsError::ResolveToPromise { .. }));
    }

    #[test]
    fn calls_to_foreign_ingress_are_forwarded() {
        let (mut vat, _log, outbox) = connected_vat("bob", &["alice", "carol"]);
        // carol's object is ingress export 1; alice may address it at egress 3.
        vat.deliver(0, "addIngress", r#"{"args":["carol",5]}"#, &[], None)
            .unwrap();
        egress_to(&mut vat, "alice", 3, Slot::export(1));

        let call = json!({
            "target": { "type": "your-egress", "id": 3 },
            "methodName": "hello",
            "args": ["hi"],
            "resultSlot": { "type": "your-answer", "id": 11 },
        });
        vat.receive("alice", &call.to_string()).unwrap();

        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "carol");
        assert_eq!(
            sent[0].json(),
            json!({
                "target": { "type": "your-egress", "id": 5 },
                "methodName": "hello",
                "args": ["hi"],
                "slots": [],
                "resultSlot": { "type": "your-answer", "id": 2 },
            })
        );
    }
}
