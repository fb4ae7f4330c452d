//! Recording connection used by negotiation tests

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::protocol::IceCandidate;
use crate::registry::MemberId;

use super::connection::{PeerConnection, SdpKind, SessionDescription};
use super::error::NegotiationError;

/// Engine call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind),
    AddCandidate(String),
    SendData(Bytes),
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_remote: bool,
    fail_candidates: bool,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `set_remote_description` fail
    pub fn failing_remote() -> Self {
        Self {
            fail_remote: true,
            ..Self::default()
        }
    }

    /// Make `add_ice_candidate` fail
    pub fn rejecting_candidates() -> Self {
        Self {
            fail_candidates: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PeerConnection for MockConnection {
    async fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.record(Call::CreateOffer);
        Ok(SessionDescription::offer("mock-offer"))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.record(Call::CreateAnswer);
        Ok(SessionDescription::answer("mock-answer"))
    }

    async fn set_local_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.record(Call::SetLocal(desc.kind));
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if self.fail_remote {
            return Err(NegotiationError::Engine("bad sdp".into()));
        }
        self.record(Call::SetRemote(desc.kind));
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        if self.fail_candidates {
            return Err(NegotiationError::Engine("bad candidate".into()));
        }
        self.record(Call::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn send_data(&mut self, data: Bytes) -> Result<(), NegotiationError> {
        self.record(Call::SendData(data));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), NegotiationError> {
        self.record(Call::Close);
        Ok(())
    }
}

/// Factory that hands out mocks and keeps a handle to each one
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    created: Arc<Mutex<Vec<(MemberId, MockConnection)>>>,
    reject_candidates: bool,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out connections whose `add_ice_candidate` fails
    pub fn rejecting_candidates() -> Self {
        Self {
            reject_candidates: true,
            ..Self::default()
        }
    }

    pub fn connection(&self, remote: &str) -> Option<MockConnection> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id.as_str() == remote)
            .map(|(_, conn)| conn.clone())
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl super::connection::ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    fn connect(&mut self, remote: &MemberId) -> Result<MockConnection, NegotiationError> {
        let conn = if self.reject_candidates {
            MockConnection::rejecting_candidates()
        } else {
            MockConnection::new()
        };
        self.created
            .lock()
            .unwrap()
            .push((remote.clone(), conn.clone()));
        Ok(conn)
    }
}
