use tracing::{debug, error, info, warn};

use tether_core::{Entry, SignedEntry};

use super::{verify_received, SettlementError};
use crate::manager::{Manager, Reconciled};
use crate::transport::Transport;

/// Responding side of settlement.
///
/// Registration happens before the reply goes out, so by the time the
/// initiator sees the countersigned entry it is already in discovery.
///
/// When the id was settled before with a different `public` flag, the reply
/// carries that earlier entry instead of the proposal, signed only by this
/// side. The initiator adopts it and adds its own signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementResponder;

enum State {
    AwaitProposal,
    Verify { proposal: SignedEntry },
    Reconcile { proposal: SignedEntry },
    CounterSign { reply: SignedEntry, reconciled: Reconciled },
    Register { settled: SignedEntry, reconciled: Reconciled },
    Reply { settled: SignedEntry, entry: Entry },
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::AwaitProposal => "await_proposal",
            State::Verify { .. } => "verify",
            State::Reconcile { .. } => "reconcile",
            State::CounterSign { .. } => "counter_sign",
            State::Register { .. } => "register",
            State::Reply { .. } => "reply",
        }
    }
}

impl SettlementResponder {
    pub async fn run<T>(self, manager: &Manager, transport: &mut T) -> Result<Entry, SettlementError>
    where
        T: Transport + ?Sized,
    {
        let result = self.drive(manager, transport).await;
        if let Err(e) = &result {
            warn!(peer = %transport.remote_id(), error = %e, "settlement as responder failed");
        }
        result
    }

    async fn drive<T>(self, manager: &Manager, transport: &mut T) -> Result<Entry, SettlementError>
    where
        T: Transport + ?Sized,
    {
        let local = transport.local_id();
        let remote = transport.remote_id();
        let mut state = State::AwaitProposal;

        loop {
            debug!(peer = %remote, state = state.name(), "responder step");
            state = match state {
                State::AwaitProposal => {
                    let proposal = transport.receive_entry().await?;
                    State::Verify { proposal }
                }

                State::Verify { proposal } => {
                    verify_received(&*transport, &proposal, &remote)?;
                    State::Reconcile { proposal }
                }

                State::Reconcile { proposal } => {
                    let reconciled = manager.reconcile(&proposal.entry).await?;
                    let reply = match reconciled.existing() {
                        Some(existing) if *existing != proposal.entry => {
                            warn!(
                                id = %existing.id,
                                kept = existing.public,
                                proposed = proposal.entry.public,
                                "visibility differs from settled entry, replying with the settled one"
                            );
                            SignedEntry::unsigned(existing.clone())
                        }
                        _ => proposal,
                    };
                    State::CounterSign { reply, reconciled }
                }

                State::CounterSign { mut reply, reconciled } => {
                    reply.set_signature(&local, manager.secret_key())?;
                    // Our key must match the identity this transport presents.
                    // On mismatch the reply still goes out so the initiator
                    // fails on the bad slot instead of waiting on a dead pipe.
                    if let Err(e) = verify_received(&*transport, &reply, &local) {
                        error!(
                            id = %reply.entry.id,
                            error = %e,
                            "countersignature does not recover to local identity"
                        );
                        drop(reconciled);
                        let _ = transport.send_entry(&reply).await;
                        return Err(e.into());
                    }
                    State::Register { settled: reply, reconciled }
                }

                State::Register { settled, reconciled } => {
                    let entry = manager.commit_settled(reconciled, &settled).await?;
                    State::Reply { settled, entry }
                }

                State::Reply { settled, entry } => {
                    transport.send_entry(&settled).await?;
                    info!(id = %entry.id, peer = %remote, public = entry.public, "transport settled");
                    return Ok(entry);
                }
            };
        }
    }
}
