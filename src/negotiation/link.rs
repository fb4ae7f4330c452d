//! Per-peer negotiation state machine
//!
//! ```text
//!   Idle ──start()/offer──► Negotiating ──transport up──► Connected
//!                               │                             │
//!                               └──── failure / close ────────┴──► Closed
//! ```
//!
//! The role is fixed at creation: a member that joins a room is the
//! Initiator toward everyone already there, and existing members are
//! Responders toward the newcomer. Only Initiators send offers, so two
//! peers never offer to each other at the same time.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::protocol::{IceCandidate, SignalEnvelope, SignalPayload};
use crate::registry::MemberId;

use super::connection::{PeerConnection, SessionDescription, TransportState};
use super::error::NegotiationError;

/// Negotiation role toward one remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Negotiating,
    Connected,
    Closed,
}

/// Negotiation state toward one remote peer
pub struct PeerLink<C> {
    local: MemberId,
    remote: MemberId,
    role: Role,
    state: LinkState,
    connection: C,

    local_description_set: bool,
    remote_description_set: bool,

    /// Candidates received before the remote description, in arrival order
    pending_candidates: VecDeque<IceCandidate>,

    signals: mpsc::UnboundedSender<SignalEnvelope>,
}

impl<C: PeerConnection> PeerLink<C> {
    /// Create an idle link
    pub fn new(
        local: MemberId,
        remote: MemberId,
        role: Role,
        connection: C,
        signals: mpsc::UnboundedSender<SignalEnvelope>,
    ) -> Self {
        Self {
            local,
            remote,
            role,
            state: LinkState::Idle,
            connection,
            local_description_set: false,
            remote_description_set: false,
            pending_candidates: VecDeque::new(),
            signals,
        }
    }

    pub fn remote(&self) -> &MemberId {
        &self.remote
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_local_description_set(&self) -> bool {
        self.local_description_set
    }

    pub fn is_remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    /// Number of candidates waiting for the remote description
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Access the underlying connection
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Begin negotiation as the Initiator: create, apply and send an offer
    pub async fn start(&mut self) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if self.role != Role::Initiator || self.state != LinkState::Idle {
            return Err(NegotiationError::OutOfSequence(format!(
                "start as {:?} in {:?}",
                self.role, self.state
            )));
        }

        self.state = LinkState::Negotiating;

        let offer = self.connection.create_offer().await?;
        self.connection.set_local_description(offer.clone()).await?;
        self.local_description_set = true;

        tracing::debug!(remote = %self.remote, "Sending offer");
        self.send(offer.into_payload())
    }

    /// Apply a payload relayed from the remote peer
    pub async fn handle_signal(&mut self, payload: SignalPayload) -> Result<(), NegotiationError> {
        self.ensure_open()?;

        match payload {
            SignalPayload::Offer { sdp } => self.handle_offer(sdp).await,
            SignalPayload::Answer { sdp } => self.handle_answer(sdp).await,
            SignalPayload::Candidate { candidate } => self.handle_candidate(candidate).await,
        }
    }

    async fn handle_offer(&mut self, sdp: String) -> Result<(), NegotiationError> {
        if self.role != Role::Responder
            || self.state != LinkState::Idle
            || self.remote_description_set
        {
            return Err(NegotiationError::OutOfSequence(format!(
                "offer as {:?} in {:?}",
                self.role, self.state
            )));
        }

        self.state = LinkState::Negotiating;

        self.connection
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        self.remote_description_set = true;
        self.flush_candidates().await;

        let answer = self.connection.create_answer().await?;
        self.connection.set_local_description(answer.clone()).await?;
        self.local_description_set = true;

        tracing::debug!(remote = %self.remote, "Sending answer");
        self.send(answer.into_payload())
    }

    async fn handle_answer(&mut self, sdp: String) -> Result<(), NegotiationError> {
        if !self.local_description_set || self.remote_description_set {
            return Err(NegotiationError::OutOfSequence(
                "duplicate or unsolicited answer".into(),
            ));
        }

        self.connection
            .set_remote_description(SessionDescription::answer(sdp))
            .await?;
        self.remote_description_set = true;

        tracing::debug!(
            remote = %self.remote,
            pending = self.pending_candidates.len(),
            "Answer applied"
        );
        self.flush_candidates().await;
        Ok(())
    }

    async fn handle_candidate(&mut self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        if !self.remote_description_set {
            self.pending_candidates.push_back(candidate);
            return Ok(());
        }

        // A bad candidate never ends the link
        if let Err(e) = self.connection.add_ice_candidate(candidate).await {
            tracing::warn!(remote = %self.remote, error = %e, "Candidate rejected");
        }
        Ok(())
    }

    /// Apply buffered candidates in arrival order
    async fn flush_candidates(&mut self) {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = self.connection.add_ice_candidate(candidate).await {
                tracing::warn!(remote = %self.remote, error = %e, "Buffered candidate rejected");
            }
        }
    }

    /// Relay a candidate gathered by the local engine
    pub fn send_local_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        self.send(SignalPayload::Candidate { candidate })
    }

    /// React to an engine transport state change
    pub async fn on_transport_state(&mut self, transport: TransportState) -> LinkState {
        match transport {
            TransportState::Connected if self.state == LinkState::Negotiating => {
                self.state = LinkState::Connected;
                tracing::info!(remote = %self.remote, role = ?self.role, "Peer connected");
            }
            t if t.is_terminal() => {
                tracing::info!(remote = %self.remote, transport = %t, "Peer transport ended");
                self.close().await;
            }
            _ => {}
        }
        self.state
    }

    /// Send a document update over the data channel
    pub async fn send_data(&mut self, data: Bytes) -> Result<(), NegotiationError> {
        match self.state {
            LinkState::Connected => self.connection.send_data(data).await,
            LinkState::Closed => Err(NegotiationError::Closed),
            _ => Err(NegotiationError::NotConnected),
        }
    }

    /// Close the link and release the connection; a closed link is never reused
    pub async fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }

        self.state = LinkState::Closed;
        self.pending_candidates.clear();

        if let Err(e) = self.connection.close().await {
            tracing::debug!(remote = %self.remote, error = %e, "Connection close failed");
        }
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.state == LinkState::Closed {
            return Err(NegotiationError::Closed);
        }
        Ok(())
    }

    fn send(&self, payload: SignalPayload) -> Result<(), NegotiationError> {
        self.signals
            .send(SignalEnvelope {
                to: self.remote.clone(),
                from: self.local.clone(),
                payload,
            })
            .map_err(|_| NegotiationError::SignalChannelClosed)
    }
}
