use tracing::{debug, info, warn};

use tether_core::{Entry, SignedEntry, TransportId, ValidationError};

use super::{verify_received, SettlementError};
use crate::manager::Manager;
use crate::transport::Transport;

/// Initiating side of settlement.
///
/// With a nil `existing_id` the transport id is derived from the edges and
/// type. Otherwise the given id is reused: if the manager already holds a
/// matching entry under it, that entry is proposed unchanged, so the
/// `public` argument only applies to transports settled for the first time.
///
/// If the responder already settled the id with the other `public` flag, it
/// answers with that entry. The initiator adopts it, signs it, and replaces
/// its own record, so both sides end with the same entry.
#[derive(Debug, Clone, Copy)]
pub struct SettlementInitiator {
    existing_id: TransportId,
    public: bool,
}

enum State {
    Propose,
    AwaitCounterSignature { proposal: SignedEntry },
    Verify { proposal: SignedEntry, reply: SignedEntry },
    Commit { settled: SignedEntry },
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Propose => "propose",
            State::AwaitCounterSignature { .. } => "await_counter_signature",
            State::Verify { .. } => "verify",
            State::Commit { .. } => "commit",
        }
    }
}

impl SettlementInitiator {
    pub fn new(existing_id: TransportId, public: bool) -> Self {
        Self { existing_id, public }
    }

    pub async fn run<T>(self, manager: &Manager, transport: &mut T) -> Result<Entry, SettlementError>
    where
        T: Transport + ?Sized,
    {
        let result = self.drive(manager, transport).await;
        if let Err(e) = &result {
            warn!(peer = %transport.remote_id(), error = %e, "settlement as initiator failed");
        }
        result
    }

    async fn drive<T>(self, manager: &Manager, transport: &mut T) -> Result<Entry, SettlementError>
    where
        T: Transport + ?Sized,
    {
        let local = transport.local_id();
        let remote = transport.remote_id();
        let mut state = State::Propose;

        loop {
            debug!(peer = %remote, state = state.name(), "initiator step");
            state = match state {
                State::Propose => {
                    let entry = self.proposal(manager, &*transport).await;
                    let proposal = SignedEntry::new(entry, &local, manager.secret_key())?;
                    transport.send_entry(&proposal).await?;
                    State::AwaitCounterSignature { proposal }
                }

                State::AwaitCounterSignature { proposal } => {
                    let reply = transport.receive_entry().await?;
                    State::Verify { proposal, reply }
                }

                State::Verify { proposal, reply } => {
                    verify_received(&*transport, &reply, &remote)?;
                    if reply.entry == proposal.entry {
                        // The responder must hand back our slot, not strip it
                        if reply.signature(&local).is_none() {
                            return Err(ValidationError::MissingSignature(local).into());
                        }
                        State::Commit { settled: reply }
                    } else if reply.entry.id == proposal.entry.id {
                        // Same id, edges and type (verified above): only the
                        // visibility differs, and the responder's came first
                        info!(
                            id = %reply.entry.id,
                            proposed = proposal.entry.public,
                            settled = reply.entry.public,
                            "adopting visibility of the settled entry"
                        );
                        let mut settled = reply;
                        settled.set_signature(&local, manager.secret_key())?;
                        State::Commit { settled }
                    } else {
                        return Err(SettlementError::InvalidEntry);
                    }
                }

                State::Commit { settled } => {
                    let entry = manager.record_settled(settled.entry).await;
                    info!(id = %entry.id, peer = %remote, public = entry.public, "transport settled");
                    return Ok(entry);
                }
            };
        }
    }

    async fn proposal<T>(&self, manager: &Manager, transport: &T) -> Entry
    where
        T: Transport + ?Sized,
    {
        let local = transport.local_id();
        let remote = transport.remote_id();
        let transport_type = transport.transport_type();

        if self.existing_id.is_nil() {
            return Entry::new(local, remote, transport_type, self.public);
        }
        match manager.entry(self.existing_id).await {
            Some(known)
                if known.edges == transport.edges() && known.transport_type == transport_type =>
            {
                known
            }
            _ => Entry::with_id(self.existing_id, local, remote, transport_type, self.public),
        }
    }
}
