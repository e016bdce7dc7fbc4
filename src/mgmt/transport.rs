//! Transport abstraction for any frame-oriented link.
//!
//! Any link that preserves frame boundaries fits: a framed UART / USB CDC
//! console, a BLE GATT characteristic (write + notify). This crate ships the
//! in-process [`LoopbackTransport`](crate::adapters::loopback::LoopbackTransport).
//!
//! The runtime and the call engine are generic over `Transport`, so adding
//! a new link requires zero changes to the protocol logic. Inbound frames
//! are handed to [`MgmtRuntime::process_frame`](super::dispatch::MgmtRuntime::process_frame)
//! by the link's own receive context.

use crate::error::TransportError;

use super::header::Header;

/// Outbound half of a management link.
pub trait Transport: Send + Sync {
    /// Queue one frame (header + CBOR body) for delivery.
    ///
    /// Every accepted frame produces at most one delivered frame at the
    /// peer. An error means nothing was sent.
    fn send(&self, header: &Header, payload: &[u8]) -> Result<(), TransportError>;

    /// Largest frame (header included) the link carries in one unit.
    fn mtu(&self) -> usize;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, header: &Header, payload: &[u8]) -> Result<(), TransportError> {
        (**self).send(header, payload)
    }

    fn mtu(&self) -> usize {
        (**self).mtu()
    }
}

/// A transport that is never connected.
/// Useful as a default before a link comes up.
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _header: &Header, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    fn mtu(&self) -> usize {
        0
    }
}
