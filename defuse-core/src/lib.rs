//! Defuse coordination protocol: one coordinator and many peripherals sharing a bomb's
//! timer, strikes, code and outcome over a lossy datagram transport.
//! Host-driven: no I/O; the host feeds received datagrams in, calls `tick()` and gets events back.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod identity;
pub mod pending;
pub mod peripheral;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod timer;
pub mod transport;
pub mod wire;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{CoordinatorConfig, InfoCorrelation, PeripheralConfig};
pub use coordinator::{Coordinator, CoordinatorEvent, CoordinatorPhase, MAX_CODE};
pub use identity::MacAddress;
pub use peripheral::{Peripheral, PeripheralEvent, PeripheralStatus};
pub use protocol::{BombInfo, Message, MessageKind, ModuleKind};
pub use transport::{Transport, TransportError};
pub use wire::{decode_datagram, encode_datagram, DecodeError, EncodeError};
