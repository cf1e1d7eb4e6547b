//! Queue container → client event.

use cnlfit_core::event::{FitEvent, TransportEvent};
use cnlfit_core::id::Uid;
use cnlfit_core::{fit_debug, fit_warn};

use crate::controller::ControllerSession;
use crate::pool::{Container, Payload};

/// Translate a dequeued container. Connect and accept indications update
/// the session's remembered peer. The container is freed on return.
pub(crate) fn translate(session: &ControllerSession, mut container: Container) -> FitEvent {
    match container.take() {
        Payload::Completion { direction, request_id, outcome } => FitEvent::DataComplete {
            direction,
            request_id,
            status: outcome.status,
            length: outcome.length,
            buffer: outcome.buffer,
        },
        Payload::Event(event) => {
            let (translated, peer) = translate_event(event);
            if let Some(uid) = peer {
                session.remember_peer(uid);
            }
            translated
        }
        Payload::Port(port) => FitEvent::Port(port),
        other => {
            fit_warn!("{}: unexpected container in event queue: {:?}", session.id, other);
            FitEvent::Unknown
        }
    }
}

/// Map a transport event; also returns the peer to remember, if any.
pub(crate) fn translate_event(event: TransportEvent) -> (FitEvent, Option<Uid>) {
    match event {
        TransportEvent::Error { status } => (FitEvent::ErrorInd { status }, None),
        TransportEvent::ConnectInd { uid, params } => (FitEvent::ConnectInd { uid, params }, Some(uid)),
        TransportEvent::AcceptInd { uid, params } => (FitEvent::AcceptInd { uid, params }, Some(uid)),
        TransportEvent::AcceptCfm { uid, .. } => (FitEvent::AcceptCfm { uid }, None),
        TransportEvent::ReleaseInd { cause, params } => (FitEvent::ReleaseInd { cause, params }, None),
        TransportEvent::PowerSaveInd { dormant_period, awake_period } => {
            (FitEvent::PowerSaveInd { dormant_period, awake_period }, None)
        }
        TransportEvent::Other { kind } => {
            fit_debug!("untranslated transport event kind {:#x}", kind);
            (FitEvent::Unknown, None)
        }
    }
}
